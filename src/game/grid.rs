use serde::{Serialize, Deserialize};

use super::config::ConfigError;

pub type Cell = (i32, i32);

// discriminants double as the action index used by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Right, Direction::Down, Direction::Left];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    // unit vector, y grows downwards
    pub fn offset(self) -> Cell {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
        }
    }

    pub fn is_opposite(self, other: Direction) -> bool {
        self.opposite() == other
    }
}

/// Toroidal board geometry. Every cell handed out by a `Grid` lies in
/// `[0, width) x [0, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: i32,
    height: i32,
}

impl Grid {
    pub fn new(width: i32, height: i32) -> Result<Self, ConfigError> {
        if width <= 0 || height <= 0 {
            return Err(ConfigError::InvalidGrid { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> i32 {self.width}
    pub fn height(&self) -> i32 {self.height}

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.0 >= 0 && cell.0 < self.width && cell.1 >= 0 && cell.1 < self.height
    }

    pub fn wrap(&self, cell: Cell) -> Cell {
        (cell.0.rem_euclid(self.width), cell.1.rem_euclid(self.height))
    }

    pub fn step(&self, cell: Cell, direction: Direction) -> Cell {
        let (dx, dy) = direction.offset();
        self.wrap((cell.0 + dx, cell.1 + dy))
    }

    // row-major index, used by the grid encoder
    pub fn index(&self, cell: Cell) -> usize {
        debug_assert!(self.contains(cell));
        cell.1 as usize * self.width as usize + cell.0 as usize
    }

    pub fn cell_at(&self, index: usize) -> Cell {
        let width = self.width as usize;
        ((index % width) as i32, (index / width) as i32)
    }

    /// Shortest signed displacement from `from` to `to`, taking the wrap into
    /// account on each axis.
    pub fn delta(&self, from: Cell, to: Cell) -> Cell {
        (
            shortest(to.0 - from.0, self.width),
            shortest(to.1 - from.1, self.height),
        )
    }

    /// Manhattan distance on the torus.
    pub fn distance(&self, a: Cell, b: Cell) -> i32 {
        let (dx, dy) = self.delta(a, b);
        dx.abs() + dy.abs()
    }

    pub fn adjacent(&self, a: Cell, b: Cell) -> bool {
        self.distance(a, b) == 1
    }
}

fn shortest(d: i32, size: i32) -> i32 {
    let d = d.rem_euclid(size);
    if d * 2 > size { d - size } else { d }
}
