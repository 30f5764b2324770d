pub mod config;
pub mod encoder;
pub mod food;
pub mod grid;
pub mod policy;
pub mod snake;

use std::collections::HashSet;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::debug;

use config::{ConfigError, GameConfig, Mode, Player};
use encoder::{Observation, StateEncoder};
use food::FoodSpawner;
use grid::{Cell, Direction, Grid};
use snake::Snake;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("engine has not been reset")]
    NotReset,
    #[error("snapshot rejected: {0}")]
    InvalidSnapshot(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    One,
    Two,
    Draw,
    /// The episode ended with nobody to credit, e.g. a solo snake crashing.
    Nobody,
}

impl Winner {
    pub fn of(player: Player) -> Self {
        match player {
            Player::One => Winner::One,
            Player::Two => Winner::Two,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,
    Running,
    Terminal(Winner),
}

/// What one tick produced. `rewards` is indexed by `Player::index()`; an
/// absent snake always receives zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    pub rewards: [f32; 2],
    pub terminal: bool,
    pub winner: Option<Winner>,
}

impl StepOutcome {
    pub fn reward(&self, player: Player) -> f32 {
        self.rewards[player.index()]
    }
}

/// Borrowed view of the board handed to encoders and scripted policies.
pub struct Board<'a> {
    pub grid: &'a Grid,
    pub snakes: [Option<&'a Snake>; 2],
    pub food: Option<Cell>,
}

impl<'a> Board<'a> {
    pub fn snake(&self, player: Player) -> Option<&'a Snake> {
        self.snakes[player.index()]
    }

    /// Whether a head arriving on `cell` next tick would die there.
    pub fn blocked(&self, cell: Cell) -> bool {
        self.snakes.iter().flatten().any(|snake| snake.blocks(cell))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnakeState {
    pub body: Vec<Cell>,
    pub direction: Direction,
}

/// Read-only copy of everything a renderer needs for one frame. Also the
/// input to `Engine::restore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snakes: [Option<SnakeState>; 2],
    pub food: Option<Cell>,
    pub scores: [u32; 2],
    pub steps: u32,
    pub phase: Phase,
}

impl Snapshot {
    pub fn terminal(&self) -> bool {
        matches!(self.phase, Phase::Terminal(_))
    }

    pub fn winner(&self) -> Option<Winner> {
        match self.phase {
            Phase::Terminal(winner) => Some(winner),
            _ => None,
        }
    }
}

/// Advances one or two snakes on a toroidal grid, one tick at a time.
///
/// A tick resolves in a fixed order: headings, new heads, self-collision,
/// head-on and body collisions between the snakes, movement and growth,
/// food, reward shaping, and finally starvation.
pub struct Engine {
    config: GameConfig,
    grid: Grid,
    encoder: StateEncoder,
    spawner: FoodSpawner,

    snakes: [Option<Snake>; 2],
    food: Option<Cell>,
    scores: [u32; 2],
    steps: u32,
    phase: Phase,
    last_food_distance: Option<i32>, // learner head to food, for shaping
}

impl Engine {
    pub fn new(config: GameConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = Grid::new(config.width, config.height)?;
        let encoder = StateEncoder::new(&grid, config.encoding, config.mode.learner());
        let spawner = FoodSpawner::new(config.seed);

        Ok(Self {
            config,
            grid,
            encoder,
            spawner,
            snakes: [None, None],
            food: None,
            scores: [0; 2],
            steps: 0,
            phase: Phase::Init,
            last_food_distance: None,
        })
    }

    pub fn config(&self) -> &GameConfig {&self.config}
    pub fn grid(&self) -> &Grid {&self.grid}
    pub fn encoder(&self) -> &StateEncoder {&self.encoder}
    pub fn mode(&self) -> Mode {self.config.mode}
    pub fn learner(&self) -> Player {self.config.mode.learner()}
    pub fn food(&self) -> Option<Cell> {self.food}
    pub fn scores(&self) -> [u32; 2] {self.scores}
    pub fn steps(&self) -> u32 {self.steps}
    pub fn phase(&self) -> Phase {self.phase}

    pub fn observation_len(&self) -> usize {
        self.encoder.len()
    }

    pub fn snake(&self, player: Player) -> Option<&Snake> {
        self.snakes[player.index()].as_ref()
    }

    pub fn score(&self, player: Player) -> u32 {
        self.scores[player.index()]
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Terminal(_))
    }

    pub fn winner(&self) -> Option<Winner> {
        match self.phase {
            Phase::Terminal(winner) => Some(winner),
            _ => None,
        }
    }

    pub fn board(&self) -> Board<'_> {
        Board {
            grid: &self.grid,
            snakes: [self.snakes[0].as_ref(), self.snakes[1].as_ref()],
            food: self.food,
        }
    }

    pub fn observe(&self) -> Observation {
        self.encoder.encode(&self.board())
    }

    /// Starts a fresh episode and returns its first observation.
    pub fn reset(&mut self) -> Observation {
        let (w, h) = (self.grid.width(), self.grid.height());
        self.snakes = match self.config.mode {
            Mode::Solo => [Some(Snake::new((w / 2, h / 2), Direction::Right)), None],
            Mode::Duel => [
                Some(Snake::new((w / 4, h / 2), Direction::Right)),
                Some(Snake::new((3 * w / 4, h / 2), Direction::Left)),
            ],
        };
        self.scores = [0; 2];
        self.steps = 0;
        self.phase = Phase::Running;
        self.food = self.spawn_food();
        self.last_food_distance = self.learner_food_distance();

        self.observe()
    }

    /// Advances the world by one tick. `moves` holds an optional requested
    /// heading per player; reversals and moves for absent players are
    /// ignored. Ticking a finished episode changes nothing.
    pub fn step(&mut self, moves: [Option<Direction>; 2]) -> Result<StepOutcome, EngineError> {
        match self.phase {
            Phase::Init => return Err(EngineError::NotReset),
            Phase::Terminal(winner) => return Ok(self.outcome([0.0; 2], Some(winner))),
            Phase::Running => {}
        }

        self.steps = self.steps.saturating_add(1);
        let rewards_cfg = self.config.rewards.clone();
        let players = self.config.mode.players();
        let mut rewards = [0.0f32; 2];

        let mut heads: [Option<Cell>; 2] = [None, None];
        for &player in players {
            let i = player.index();
            if let Some(snake) = self.snakes[i].as_mut() {
                if let Some(direction) = moves[i] {
                    snake.steer(direction);
                }
                let head = snake.next_head(&self.grid);
                // eating keeps the tail in place on this same move
                if Some(head) == self.food {
                    snake.grow();
                }
                heads[i] = Some(head);
                rewards[i] = rewards_cfg.step_cost;
            }
        }

        if let Some(winner) = self.resolve_collisions(&heads) {
            for &player in players {
                rewards[player.index()] += match winner {
                    Winner::Draw => rewards_cfg.draw,
                    Winner::Nobody => rewards_cfg.loss,
                    w if w == Winner::of(player) => rewards_cfg.win,
                    _ => rewards_cfg.loss,
                };
            }
            debug!(?winner, steps = self.steps, "collision ended episode");
            return Ok(self.finish(rewards, winner));
        }

        let mut ate = false;
        for &player in players {
            let i = player.index();
            if let (Some(snake), Some(head)) = (self.snakes[i].as_mut(), heads[i]) {
                snake.advance(head);
                if Some(head) == self.food {
                    self.scores[i] = self.scores[i].saturating_add(1);
                    rewards[i] += rewards_cfg.food;
                    ate = true;
                }
            }
        }

        let learner = self.learner();
        let current_distance = self.learner_food_distance();
        if ate {
            self.food = self.spawn_food();
            self.last_food_distance = self.learner_food_distance();
        } else {
            if let (Some(before), Some(after)) = (self.last_food_distance, current_distance) {
                rewards[learner.index()] += rewards_cfg.shaping * (before - after) as f32;
            }
            self.last_food_distance = current_distance;
        }

        // widened so any validated factor fits
        let eaten: u64 = self.scores.iter().map(|&s| u64::from(s)).sum();
        let limit = u64::from(self.config.starvation_factor).saturating_mul(eaten + 1);
        if u64::from(self.steps) > limit {
            let winner = match self.config.mode {
                Mode::Solo => Winner::Nobody,
                Mode::Duel if self.scores[0] > self.scores[1] => Winner::One,
                Mode::Duel if self.scores[1] > self.scores[0] => Winner::Two,
                Mode::Duel => Winner::Draw,
            };
            debug!(?winner, steps = self.steps, "episode starved");
            return Ok(self.finish(rewards, winner));
        }

        Ok(self.outcome(rewards, None))
    }

    // self-collision is settled before the snakes are checked against each other
    fn resolve_collisions(&self, heads: &[Option<Cell>; 2]) -> Option<Winner> {
        let crashed: Vec<bool> = (0..2)
            .map(|i| match (&self.snakes[i], heads[i]) {
                (Some(snake), Some(head)) => snake.blocks(head),
                _ => false,
            })
            .collect();

        match self.config.mode {
            Mode::Solo => return crashed[0].then_some(Winner::Nobody),
            Mode::Duel => match (crashed[0], crashed[1]) {
                (true, true) => return Some(Winner::Draw),
                (true, false) => return Some(Winner::Two),
                (false, true) => return Some(Winner::One),
                (false, false) => {}
            },
        }

        let (Some(one), Some(two)) = (&self.snakes[0], &self.snakes[1]) else {
            return None;
        };
        let (Some(h1), Some(h2)) = (heads[0], heads[1]) else {
            return None;
        };

        // head-on: same target cell, or moving into the other's current head
        if h1 == h2 || h1 == two.head() || h2 == one.head() {
            return Some(Winner::Draw);
        }

        match (two.blocks(h1), one.blocks(h2)) {
            (true, true) => Some(Winner::Draw),
            (true, false) => Some(Winner::Two),
            (false, true) => Some(Winner::One),
            (false, false) => None,
        }
    }

    fn finish(&mut self, rewards: [f32; 2], winner: Winner) -> StepOutcome {
        self.phase = Phase::Terminal(winner);
        self.outcome(rewards, Some(winner))
    }

    fn outcome(&self, rewards: [f32; 2], winner: Option<Winner>) -> StepOutcome {
        StepOutcome {
            observation: self.observe(),
            rewards,
            terminal: winner.is_some(),
            winner,
        }
    }

    fn spawn_food(&mut self) -> Option<Cell> {
        let snakes = &self.snakes;
        self.spawner.spawn(&self.grid, |cell| {
            snakes.iter().flatten().any(|snake| snake.contains(cell))
        })
    }

    fn learner_food_distance(&self) -> Option<i32> {
        let head = self.snake(self.learner())?.head();
        Some(self.grid.distance(head, self.food?))
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = |snake: &Option<Snake>| {
            snake.as_ref().map(|s| SnakeState {
                body: s.body().iter().copied().collect(),
                direction: s.direction(),
            })
        };
        Snapshot {
            snakes: [state(&self.snakes[0]), state(&self.snakes[1])],
            food: self.food,
            scores: self.scores,
            steps: self.steps,
            phase: self.phase,
        }
    }

    /// Loads an arbitrary position, e.g. a recorded frame. The snapshot must
    /// seat exactly the players of this engine's mode on contiguous,
    /// non-overlapping bodies, with the food on a free cell.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<Observation, EngineError> {
        let invalid = |msg: String| Err(EngineError::InvalidSnapshot(msg));

        if snapshot.phase == Phase::Init {
            return invalid("cannot restore into the init phase".into());
        }

        let mut occupied = HashSet::new();
        let mut snakes: [Option<Snake>; 2] = [None, None];
        for player in [Player::One, Player::Two] {
            let expected = self.config.mode.players().contains(&player);
            let Some(state) = &snapshot.snakes[player.index()] else {
                if expected {
                    return invalid(format!("{player:?} is missing"));
                }
                continue;
            };
            if !expected {
                return invalid(format!("{player:?} has no seat in {:?} mode", self.config.mode));
            }
            if state.body.is_empty() {
                return invalid(format!("{player:?} has an empty body"));
            }
            for (k, &cell) in state.body.iter().enumerate() {
                if !self.grid.contains(cell) {
                    return invalid(format!("{player:?} cell {cell:?} is off the grid"));
                }
                if !occupied.insert(cell) {
                    return invalid(format!("cell {cell:?} is occupied twice"));
                }
                if k > 0 && !self.grid.adjacent(state.body[k - 1], cell) {
                    return invalid(format!("{player:?} body is not contiguous at {cell:?}"));
                }
            }
            snakes[player.index()] = Some(Snake::from_body(state.body.clone(), state.direction));
        }

        if let Some(food) = snapshot.food {
            if !self.grid.contains(food) || occupied.contains(&food) {
                return invalid(format!("food {food:?} is not on a free cell"));
            }
        }

        self.snakes = snakes;
        self.food = snapshot.food;
        self.scores = snapshot.scores;
        self.steps = snapshot.steps;
        self.phase = snapshot.phase;
        self.last_food_distance = self.learner_food_distance();

        Ok(self.observe())
    }
}
