use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Errors raised when validating configuration values. These are fatal at
/// construction time.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("grid must be at least 1x1, got {width}x{height}")]
    InvalidGrid { width: i32, height: i32 },
    #[error("grid {width}x{height} is too small to seat two snakes")]
    GridTooSmallForDuel { width: i32, height: i32 },
    #[error("replay buffer capacity must be non-zero")]
    ZeroCapacity,
    #[error("batch size must be non-zero")]
    ZeroBatchSize,
    #[error("target sync interval must be non-zero")]
    ZeroSyncInterval,
    #[error("starvation factor must be non-zero")]
    ZeroStarvationFactor,
    #[error("epsilon schedule is invalid: start {start}, min {min}, decay {decay}")]
    InvalidEpsilon { start: f32, min: f32, decay: f32 },
    #[error("discount factor {0} must lie in [0, 1]")]
    InvalidDiscount(f32),
    #[error("reward ordering violated: {0}")]
    InvalidRewards(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Only `Player::One` is on the board; it is the learner.
    Solo,
    /// `Player::One` is the scripted or human snake, `Player::Two` learns.
    Duel,
}

impl Mode {
    pub fn players(self) -> &'static [Player] {
        match self {
            Mode::Solo => &[Player::One],
            Mode::Duel => &[Player::One, Player::Two],
        }
    }

    pub fn learner(self) -> Player {
        match self {
            Mode::Solo => Player::One,
            Mode::Duel => Player::Two,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// Occupancy channels for both snakes and the food, heading one-hots and
    /// the normalized food direction.
    Grid,
    /// Sixteen hand-picked features relative to the learner's head.
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewardConfig {
    /// Added to every snake's reward on every tick
    pub step_cost: f32,
    /// Eating food
    pub food: f32,
    /// Dying, either by self-collision or by running into the opponent
    pub loss: f32,
    /// Outliving the opponent
    pub win: f32,
    /// Head-on contact, given to both snakes
    pub draw: f32,
    /// Coefficient on the learner's reduction in distance to the food
    pub shaping: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            step_cost: -0.01,
            food: 10.0,
            loss: -10.0,
            win: 5.0,
            draw: -10.0,
            shaping: 1.0,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.loss < 0.0 && self.win > 0.0) {
            return Err(ConfigError::InvalidRewards("loss < 0 < win"));
        }
        if !(self.food > 0.0 && self.step_cost < 0.0) {
            return Err(ConfigError::InvalidRewards("step_cost < 0 < food"));
        }
        if self.shaping < 0.0 {
            return Err(ConfigError::InvalidRewards("shaping >= 0"));
        }
        Ok(())
    }
}

/// Configuration for one simulation engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    pub width: i32,
    pub height: i32,
    pub mode: Mode,
    pub encoding: Encoding,
    pub rewards: RewardConfig,
    /// An episode starves once `steps > starvation_factor * (total food + 1)`
    pub starvation_factor: u32,
    /// Seed for food placement; `None` draws one from the thread rng
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 36,
            height: 36,
            mode: Mode::Duel,
            encoding: Encoding::Grid,
            rewards: RewardConfig::default(),
            starvation_factor: 100,
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn new(width: i32, height: i32, mode: Mode) -> Self {
        Self {
            width,
            height,
            mode,
            ..Default::default()
        }
    }

    pub fn solo(width: i32, height: i32) -> Self {
        Self::new(width, height, Mode::Solo)
    }

    pub fn duel(width: i32, height: i32) -> Self {
        Self::new(width, height, Mode::Duel)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(ConfigError::InvalidGrid { width: self.width, height: self.height });
        }
        // the two spawn columns are width/4 and 3*width/4
        if self.mode == Mode::Duel && self.width < 2 {
            return Err(ConfigError::GridTooSmallForDuel { width: self.width, height: self.height });
        }
        if self.starvation_factor == 0 {
            return Err(ConfigError::ZeroStarvationFactor);
        }
        self.rewards.validate()
    }
}
