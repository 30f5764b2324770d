use super::Board;
use super::config::{Encoding, Player};
use super::grid::{Cell, Direction, Grid};

pub type Observation = Vec<f32>;

const CHANNELS: usize = 3;
const COMPACT_FEATURES: usize = 16;

/// Projects a board into the fixed-length vector fed to the Q-function.
///
/// The length depends only on the grid size and the encoding, never on the
/// contents of the board, so it is safe to size a network from `len()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateEncoder {
    encoding: Encoding,
    learner: Player,
    width: usize,
    height: usize,
}

impl StateEncoder {
    pub fn new(grid: &Grid, encoding: Encoding, learner: Player) -> Self {
        Self {
            encoding,
            learner,
            width: grid.width() as usize,
            height: grid.height() as usize,
        }
    }

    pub fn encoding(&self) -> Encoding {self.encoding}

    pub fn len(&self) -> usize {
        match self.encoding {
            // channels + two heading one-hots + food direction
            Encoding::Grid => self.width * self.height * CHANNELS + 4 + 4 + 2,
            Encoding::Compact => COMPACT_FEATURES,
        }
    }

    pub fn encode(&self, board: &Board) -> Observation {
        let observation = match self.encoding {
            Encoding::Grid => self.encode_grid(board),
            Encoding::Compact => self.encode_compact(board),
        };
        debug_assert_eq!(observation.len(), self.len());
        observation
    }

    // layout: [cell (y, x)][snake one, snake two, food], then headings, then food direction
    fn encode_grid(&self, board: &Board) -> Observation {
        let grid = board.grid;
        let mut out = vec![0.0; self.len()];

        for (channel, player) in [Player::One, Player::Two].into_iter().enumerate() {
            if let Some(snake) = board.snake(player) {
                for &cell in snake.body() {
                    out[grid.index(cell) * CHANNELS + channel] = 1.0;
                }
            }
        }
        if let Some(food) = board.food {
            out[grid.index(food) * CHANNELS + 2] = 1.0;
        }

        let mut offset = grid.area() * CHANNELS;
        for player in [Player::One, Player::Two] {
            if let Some(snake) = board.snake(player) {
                out[offset + snake.direction().index()] = 1.0;
            }
            offset += 4;
        }

        if let (Some(food), Some(learner)) = (board.food, board.snake(self.learner)) {
            let (dx, dy) = grid.delta(learner.head(), food);
            let norm = (dx.abs() + dy.abs()) as f32;
            if norm > 0.0 {
                out[offset] = dx as f32 / norm;
                out[offset + 1] = dy as f32 / norm;
            }
        }

        out
    }

    // state: [danger u,r,d,l; heading u,r,d,l; food u,r,d,l; opponent u,r,d,l]
    fn encode_compact(&self, board: &Board) -> Observation {
        let mut out = vec![0.0; COMPACT_FEATURES];
        let Some(learner) = board.snake(self.learner) else {
            return out;
        };
        let head = learner.head();

        for direction in Direction::ALL {
            let cell = board.grid.step(head, direction);
            out[direction.index()] = board.blocked(cell) as i32 as f32;
        }
        out[4 + learner.direction().index()] = 1.0;

        if let Some(food) = board.food {
            write_bearing(&mut out[8..12], board.grid, head, food);
        }
        if let Some(opponent) = board.snake(self.learner.opponent()) {
            write_bearing(&mut out[12..16], board.grid, head, opponent.head());
        }

        out
    }
}

fn write_bearing(out: &mut [f32], grid: &Grid, from: Cell, to: Cell) {
    let (dx, dy) = grid.delta(from, to);
    out[Direction::Up.index()] = (dy < 0) as i32 as f32;
    out[Direction::Right.index()] = (dx > 0) as i32 as f32;
    out[Direction::Down.index()] = (dy > 0) as i32 as f32;
    out[Direction::Left.index()] = (dx < 0) as i32 as f32;
}
