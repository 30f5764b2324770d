pub mod sequential;

pub use sequential::tensor::Tensor;
pub use sequential::layer::{
    Layer,
    Dense,
    ReLU,
};
pub use sequential::loss::{
    Loss,
    Huber,
};
pub use sequential::optimizer::{
    Optimizer,
    SGD,
    Adam,
};
pub use sequential::Sequential;

pub mod agent;

pub use agent::{Agent, AgentConfig, EpisodeReport, EvalRecord, OptimizerKind, Tally};
pub use agent::approximator::{QFunction, QNetwork};
pub use agent::checkpoint::CheckpointError;
pub use agent::replaybuffer::{ReplayBuffer, SharedReplayBuffer, Transition};

pub mod game;

pub use game::{Engine, EngineError, Snapshot, StepOutcome, Winner};
pub use game::config::{ConfigError, Encoding, GameConfig, Mode, Player, RewardConfig};
pub use game::grid::{Cell, Direction, Grid};
