use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::{Serialize, Deserialize};

use super::Board;
use super::config::Player;
use super::grid::Direction;

/// A non-learned source of headings for one snake, standing in for a human
/// at the keyboard. `None` keeps the current heading.
pub trait Policy: Send {
    fn choose(&mut self, board: &Board, player: Player) -> Option<Direction>;
}

/// Never turns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

impl Policy for Idle {
    fn choose(&mut self, _board: &Board, _player: Player) -> Option<Direction> {
        None
    }
}

/// Turns at random every so often.
pub struct Wander {
    rng: StdRng,
    turn_chance: f32,
}

impl Wander {
    pub fn new(turn_chance: f32, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        Self {
            rng: StdRng::seed_from_u64(seed),
            turn_chance,
        }
    }
}

impl Policy for Wander {
    fn choose(&mut self, _board: &Board, _player: Player) -> Option<Direction> {
        if self.rng.random::<f32>() < self.turn_chance {
            Direction::from_index(self.rng.random_range(0..4))
        } else {
            None
        }
    }
}

/// Heads for the food along the shorter way round the torus and steps around
/// anything that would kill it next tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greedy;

impl Policy for Greedy {
    fn choose(&mut self, board: &Board, player: Player) -> Option<Direction> {
        let snake = board.snake(player)?;
        let head = snake.head();
        let heading = snake.direction();

        let safe = |d: Direction| !d.is_opposite(heading) && !board.blocked(board.grid.step(head, d));

        let mut preferred = Vec::with_capacity(4);
        if let Some(food) = board.food {
            let (dx, dy) = board.grid.delta(head, food);
            if dx > 0 { preferred.push(Direction::Right); }
            if dx < 0 { preferred.push(Direction::Left); }
            if dy > 0 { preferred.push(Direction::Down); }
            if dy < 0 { preferred.push(Direction::Up); }
        }
        preferred.push(heading);
        preferred.extend(Direction::ALL);

        preferred.into_iter().find(|&d| safe(d)).or(Some(heading))
    }
}

/// Names the scripted policies so they can be picked from a config file or
/// the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Idle,
    Wander,
    Greedy,
}

impl PolicyKind {
    pub fn build(self, seed: Option<u64>) -> Box<dyn Policy> {
        match self {
            PolicyKind::Idle => Box::new(Idle),
            PolicyKind::Wander => Box::new(Wander::new(0.2, seed)),
            PolicyKind::Greedy => Box::new(Greedy),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idle" => Ok(PolicyKind::Idle),
            "wander" => Ok(PolicyKind::Wander),
            "greedy" => Ok(PolicyKind::Greedy),
            other => Err(format!("unknown policy '{}', expected idle, wander or greedy", other)),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyKind::Idle => "idle",
            PolicyKind::Wander => "wander",
            PolicyKind::Greedy => "greedy",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::Grid;
    use crate::game::snake::Snake;

    #[test]
    fn test_greedy_moves_toward_food() {
        let grid = Grid::new(10, 10).unwrap();
        let snake = Snake::new((5, 5), Direction::Right);
        let board = Board { grid: &grid, snakes: [Some(&snake), None], food: Some((5, 2)) };
        assert_eq!(Greedy.choose(&board, Player::One), Some(Direction::Up));
    }

    #[test]
    fn test_greedy_avoids_blocked_cells() {
        let grid = Grid::new(10, 10).unwrap();
        let snake = Snake::new((5, 5), Direction::Right);
        let wall = Snake::from_body(vec![(5, 4), (6, 4), (7, 4)], Direction::Left);
        let board = Board { grid: &grid, snakes: [Some(&snake), Some(&wall)], food: Some((5, 2)) };
        assert_eq!(Greedy.choose(&board, Player::One), Some(Direction::Right));
    }

    #[test]
    fn test_idle_keeps_heading() {
        let grid = Grid::new(10, 10).unwrap();
        let snake = Snake::new((5, 5), Direction::Right);
        let board = Board { grid: &grid, snakes: [Some(&snake), None], food: None };
        assert_eq!(Idle.choose(&board, Player::One), None);
    }

    #[test]
    fn test_wander_is_reproducible() {
        let grid = Grid::new(10, 10).unwrap();
        let snake = Snake::new((5, 5), Direction::Right);
        let board = Board { grid: &grid, snakes: [Some(&snake), None], food: None };
        let mut a = Wander::new(0.5, Some(9));
        let mut b = Wander::new(0.5, Some(9));
        for _ in 0..20 {
            assert_eq!(a.choose(&board, Player::One), b.choose(&board, Player::One));
        }
    }

    #[test]
    fn test_policy_kind_parses_names() {
        assert_eq!("Greedy".parse::<PolicyKind>(), Ok(PolicyKind::Greedy));
        assert_eq!("wander".parse::<PolicyKind>(), Ok(PolicyKind::Wander));
        assert!("human".parse::<PolicyKind>().is_err());
        assert_eq!(PolicyKind::Idle.to_string(), "idle");
    }
}
