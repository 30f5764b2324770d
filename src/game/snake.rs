use std::collections::{HashSet, VecDeque};

use super::grid::{Cell, Direction, Grid};

/// One snake on the board. `body[0]` is the head.
#[derive(Debug, Clone, PartialEq)]
pub struct Snake {
    body: VecDeque<Cell>,
    direction: Direction,
    pending_growth: bool,
    segments: HashSet<Cell>, // for O(1) collision queries
}

impl Snake {
    pub fn new(head: Cell, direction: Direction) -> Self {
        Self::from_body(vec![head], direction)
    }

    /// Builds a snake from head-first cells. The caller is responsible for the
    /// body being contiguous and duplicate-free; `Engine::restore` checks it.
    pub fn from_body(cells: Vec<Cell>, direction: Direction) -> Self {
        let segments = cells.iter().copied().collect();
        Self {
            body: cells.into(),
            direction,
            pending_growth: false,
            segments,
        }
    }

    pub fn head(&self) -> Cell {
        self.body[0]
    }

    pub fn tail(&self) -> Cell {
        self.body[self.body.len() - 1]
    }

    pub fn body(&self) -> &VecDeque<Cell> {&self.body}
    pub fn direction(&self) -> Direction {self.direction}
    pub fn len(&self) -> usize {self.body.len()}
    pub fn pending_growth(&self) -> bool {self.pending_growth}

    pub fn contains(&self, cell: Cell) -> bool {
        self.segments.contains(&cell)
    }

    /// Applies a requested heading. Reversals are ignored. Returns whether the
    /// heading changed.
    pub fn steer(&mut self, requested: Direction) -> bool {
        if requested.is_opposite(self.direction) || requested == self.direction {
            return false;
        }
        self.direction = requested;
        true
    }

    pub fn next_head(&self, grid: &Grid) -> Cell {
        grid.step(self.head(), self.direction)
    }

    /// Whether the tail cell is still occupied after this tick's move.
    pub fn tail_stays(&self) -> bool {
        self.pending_growth
    }

    /// Occupancy as seen by a head arriving this tick: the tail is free unless
    /// the snake is growing.
    pub fn blocks(&self, cell: Cell) -> bool {
        self.contains(cell) && (cell != self.tail() || self.tail_stays())
    }

    pub fn grow(&mut self) {
        self.pending_growth = true;
    }

    /// Moves the head to `new_head` and drops the tail unless growth is
    /// pending. The growth flag is consumed here.
    pub fn advance(&mut self, new_head: Cell) {
        if self.pending_growth {
            self.pending_growth = false;
        } else if let Some(old_tail) = self.body.pop_back() {
            self.segments.remove(&old_tail);
        }
        self.body.push_front(new_head);
        self.segments.insert(new_head);
        debug_assert_eq!(self.segments.len(), self.body.len(), "snake body overlaps itself");
    }
}
