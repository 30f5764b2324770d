pub mod approximator;
pub mod checkpoint;
pub mod replaybuffer;

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use approximator::{QFunction, QNetwork, Sample};
use checkpoint::{Checkpoint, CheckpointError};
use replaybuffer::{ReplayBuffer, SharedReplayBuffer, Transition};
use crate::game::{Engine, EngineError, StepOutcome, Winner};
use crate::game::config::{ConfigError, GameConfig, Player};
use crate::game::grid::Direction;
use crate::game::policy::Policy;

/// One action per absolute heading, indexed by `Direction::index`.
pub const ACTIONS: usize = Direction::ALL.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    /// Multiplied into epsilon after every update
    pub epsilon_decay: f32,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    /// Updates between copies of the online network into the target network
    pub target_sync_interval: u64,
    pub learning_rate: f32,
    pub hidden_layers: Vec<usize>,
    /// Global gradient norm bound; zero or less disables clipping
    pub max_grad_norm: f32,
    pub optimizer: OptimizerKind,
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.9995,
            batch_size: 128,
            buffer_capacity: 100_000,
            target_sync_interval: 1000,
            learning_rate: 0.00025,
            hidden_layers: vec![256, 128],
            max_grad_norm: 10.0,
            optimizer: OptimizerKind::Adam,
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.target_sync_interval == 0 {
            return Err(ConfigError::ZeroSyncInterval);
        }
        let epsilon_ok = (0.0..=1.0).contains(&self.epsilon_min)
            && (self.epsilon_min..=1.0).contains(&self.epsilon_start)
            && self.epsilon_decay > 0.0
            && self.epsilon_decay <= 1.0;
        if !epsilon_ok {
            return Err(ConfigError::InvalidEpsilon {
                start: self.epsilon_start,
                min: self.epsilon_min,
                decay: self.epsilon_decay,
            });
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::InvalidDiscount(self.gamma));
        }
        Ok(())
    }
}

/// Summary of one episode, one CSV row in the training log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeReport {
    pub episode: u64,
    pub total_reward: f32,
    pub steps: u32,
    /// Mean loss over the updates made during the episode, if any
    pub mean_loss: Option<f32>,
    pub epsilon: f32,
    pub winner: Winner,
    pub score_one: u32,
    pub score_two: u32,
}

/// Match results from the learner's side of the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    /// Solo episodes, which nobody wins
    pub undecided: u32,
}

impl Tally {
    pub fn record(&mut self, winner: Winner, learner: Player) {
        match winner {
            Winner::Draw => self.draws += 1,
            Winner::Nobody => self.undecided += 1,
            w if w == Winner::of(learner) => self.wins += 1,
            _ => self.losses += 1,
        }
    }

    pub fn played(&self) -> u32 {
        self.wins + self.losses + self.draws + self.undecided
    }
}

/// Mean greedy reward measured after `episode` training episodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvalRecord {
    pub episode: u64,
    pub mean_reward: f32,
}

/// A point where a training run stops between episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pause {
    /// Episodes to train since the previous pause
    pub episodes: usize,
    pub save: bool,
    pub evaluate: bool,
}

/// Splits `total` episodes at every multiple of either interval. A zero
/// interval never triggers. The last pause always saves.
pub fn training_schedule(total: usize, save_interval: usize, eval_interval: usize) -> Vec<Pause> {
    let next = |done: usize, every: usize| (every > 0).then(|| (done / every + 1) * every);
    let hits = |at: usize, every: usize| every > 0 && at % every == 0;

    let mut pauses = Vec::new();
    let mut done = 0;
    while done < total {
        let at = [next(done, save_interval), next(done, eval_interval)]
            .into_iter()
            .flatten()
            .fold(total, usize::min);
        pauses.push(Pause {
            episodes: at - done,
            save: at == total || hits(at, save_interval),
            evaluate: hits(at, eval_interval),
        });
        done = at;
    }
    pauses
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    StdRng::seed_from_u64(seed.unwrap_or_else(|| rand::rng().random()))
}

/// Index of the largest value; ties go to the lowest index.
pub fn greedy_action(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate().skip(1) {
        if value > values[best] {
            best = i;
        }
    }
    best
}

fn epsilon_greedy<Q: QFunction, R: Rng + ?Sized>(network: &Q, state: &[f32], epsilon: f32, rng: &mut R) -> usize {
    if rng.random::<f32>() < epsilon {
        rng.random_range(0..network.action_count())
    } else {
        greedy_action(&network.predict(state))
    }
}

// the learner takes `action`, every other seat asks the opponent policy
fn tick(engine: &mut Engine, opponent: &mut dyn Policy, action: usize) -> Result<StepOutcome, EngineError> {
    let learner = engine.learner();
    let mut moves = [None; 2];
    moves[learner.index()] = Direction::from_index(action);
    for &player in engine.mode().players() {
        if player != learner {
            moves[player.index()] = opponent.choose(&engine.board(), player);
        }
    }
    engine.step(moves)
}

/// Epsilon-greedy DQN controller with experience replay and a lagged target
/// network.
pub struct Agent<Q: QFunction = QNetwork> {
    network: Q,
    buffer: ReplayBuffer,
    config: AgentConfig,
    rng: StdRng,

    epsilon: f32,
    step_count: u64,
    episodes: u64,
}

impl Agent<QNetwork> {
    /// A fresh, untrained agent for observations of length `state_len`.
    pub fn new(state_len: usize, config: AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = seeded_rng(config.seed);
        let network = QNetwork::new(state_len, ACTIONS, &config, &mut rng);
        Self::from_parts(network, config, rng)
    }

    /// Loads `path`, or starts untrained when the checkpoint is missing,
    /// unreadable, or shaped for a different board.
    pub fn load_or_fresh(path: impl AsRef<Path>, state_len: usize, config: AgentConfig) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match Self::load(path, state_len, config.clone()) {
            Ok(agent) => Ok(agent),
            Err(err) => {
                warn!(path = %path.display(), %err, "could not load checkpoint, starting from an untrained network");
                Self::new(state_len, config)
            }
        }
    }
}

impl<Q: QFunction> Agent<Q> {
    pub fn with_network(network: Q, config: AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = seeded_rng(config.seed);
        Self::from_parts(network, config, rng)
    }

    fn from_parts(network: Q, config: AgentConfig, rng: StdRng) -> Result<Self, ConfigError> {
        let buffer = ReplayBuffer::new(config.buffer_capacity)?;
        Ok(Self {
            network,
            buffer,
            epsilon: config.epsilon_start,
            config,
            rng,
            step_count: 0,
            episodes: 0,
        })
    }

    pub fn network(&self) -> &Q {&self.network}
    pub fn config(&self) -> &AgentConfig {&self.config}
    pub fn buffer(&self) -> &ReplayBuffer {&self.buffer}
    pub fn epsilon(&self) -> f32 {self.epsilon}
    pub fn step_count(&self) -> u64 {self.step_count}
    pub fn episodes(&self) -> u64 {self.episodes}

    /// With `explore` the action is uniformly random with probability
    /// epsilon. Without it the greedy action is always returned.
    pub fn select_action(&mut self, state: &[f32], explore: bool) -> usize {
        if explore {
            epsilon_greedy(&self.network, state, self.epsilon, &mut self.rng)
        } else {
            greedy_action(&self.network.predict(state))
        }
    }

    pub fn observe(&mut self, transition: Transition) {
        self.buffer.push(transition);
    }

    /// One replay update. Returns `None` until the buffer holds a full batch.
    pub fn train_step(&mut self) -> Option<f32> {
        let batch = self.buffer.sample(self.config.batch_size, &mut self.rng).ok()?;

        let next_states: Vec<&[f32]> = batch.iter().map(|t| t.next_state.as_slice()).collect();
        let next_values = self.network.predict_target(&next_states);

        let gamma = self.config.gamma;
        let samples: Vec<Sample> = batch.iter().zip(&next_values)
            .map(|(t, values)| {
                let target = if t.terminal {
                    t.reward
                } else {
                    let best = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    t.reward + gamma * best
                };
                Sample { state: &t.state, action: t.action, target }
            })
            .collect();
        let loss = self.network.update(&samples);

        if self.step_count % self.config.target_sync_interval == 0 {
            self.network.sync_target();
            debug!(step_count = self.step_count, "target network synced");
        }
        self.step_count += 1;
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);

        Some(loss)
    }

    /// Plays one episode from a fresh reset. With `train` every transition
    /// is stored and followed by a replay update; otherwise actions are
    /// greedy and nothing is learned.
    pub fn run_episode(&mut self, engine: &mut Engine, opponent: &mut dyn Policy, train: bool) -> Result<EpisodeReport, EngineError> {
        debug_assert_eq!(engine.observation_len(), self.network.state_len());
        let learner = engine.learner();
        let mut state = engine.reset();
        let mut total_reward = 0.0;
        let (mut loss_sum, mut updates) = (0.0, 0u32);

        let winner = loop {
            let action = self.select_action(&state, train);
            let outcome = tick(engine, opponent, action)?;
            let reward = outcome.reward(learner);
            total_reward += reward;

            if train {
                self.observe(Transition {
                    state,
                    action,
                    reward,
                    next_state: outcome.observation.clone(),
                    terminal: outcome.terminal,
                });
                if let Some(loss) = self.train_step() {
                    loss_sum += loss;
                    updates += 1;
                }
            }
            state = outcome.observation;

            if outcome.terminal {
                break outcome.winner.unwrap_or(Winner::Nobody);
            }
        };

        if train {
            self.episodes += 1;
        }
        let [score_one, score_two] = engine.scores();
        Ok(EpisodeReport {
            episode: self.episodes,
            total_reward,
            steps: engine.steps(),
            mean_loss: (updates > 0).then(|| loss_sum / updates as f32),
            epsilon: self.epsilon,
            winner,
            score_one,
            score_two,
        })
    }

    pub fn train(&mut self, engine: &mut Engine, opponent: &mut dyn Policy, episodes: usize) -> Result<Vec<EpisodeReport>, EngineError> {
        let mut reports = Vec::with_capacity(episodes);
        for _ in 0..episodes {
            let report = self.run_episode(engine, opponent, true)?;
            info!(
                episode = report.episode,
                reward = report.total_reward,
                steps = report.steps,
                epsilon = report.epsilon,
                winner = ?report.winner,
                "episode finished"
            );
            reports.push(report);
        }
        Ok(reports)
    }

    /// Mean learner reward over `episodes` greedy episodes.
    pub fn evaluate(&mut self, engine: &mut Engine, opponent: &mut dyn Policy, episodes: usize) -> Result<f32, EngineError> {
        if episodes == 0 {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for _ in 0..episodes {
            total += self.run_episode(engine, opponent, false)?.total_reward;
        }
        let mean = total / episodes as f32;
        info!(episodes, mean_reward = mean, "evaluation finished");
        Ok(mean)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError>
    where
        Q: Serialize,
    {
        Checkpoint::new(&self.network, self.epsilon, self.step_count, self.episodes).save(path)
    }

    /// Restores network, optimizer state, epsilon and step count. The replay
    /// buffer starts empty.
    pub fn load(path: impl AsRef<Path>, state_len: usize, config: AgentConfig) -> Result<Self, CheckpointError>
    where
        Q: DeserializeOwned,
    {
        config.validate()?;
        let checkpoint: Checkpoint<Q> = Checkpoint::load(path)?;
        let network = checkpoint.network;
        if network.state_len() != state_len || network.action_count() != ACTIONS {
            return Err(CheckpointError::ShapeMismatch {
                expected_inputs: state_len,
                expected_actions: ACTIONS,
                found_inputs: network.state_len(),
                found_actions: network.action_count(),
            });
        }

        let rng = seeded_rng(config.seed);
        let mut agent = Self::from_parts(network, config, rng)?;
        agent.epsilon = checkpoint.epsilon;
        agent.step_count = checkpoint.step_count;
        agent.episodes = checkpoint.episodes;
        Ok(agent)
    }
}

/// Plays `episodes` episodes on the rayon pool with a frozen epsilon-greedy
/// policy over `network`, pushing each finished episode into `buffer`. Every
/// episode gets its own engine seeded from `seed`. Returns the number of
/// transitions pushed.
pub fn collect_parallel<Q, F>(
    network: &Q,
    epsilon: f32,
    game: &GameConfig,
    episodes: usize,
    make_opponent: F,
    buffer: &SharedReplayBuffer,
    seed: u64,
) -> Result<usize, CollectError>
where
    Q: QFunction + Sync,
    F: Fn(usize) -> Box<dyn Policy> + Sync,
{
    game.validate()?;
    let pushed = (0..episodes).into_par_iter()
        .map(|episode| -> Result<usize, CollectError> {
            let mut config = game.clone();
            config.seed = Some(seed.wrapping_add(episode as u64));
            let mut engine = Engine::new(config)?;
            let mut opponent = make_opponent(episode);
            let mut rng = StdRng::seed_from_u64(seed ^ (episode as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));

            let learner = engine.learner();
            let mut state = engine.reset();
            let mut transitions = Vec::new();
            loop {
                let action = epsilon_greedy(network, &state, epsilon, &mut rng);
                let outcome = tick(&mut engine, opponent.as_mut(), action)?;
                let terminal = outcome.terminal;
                transitions.push(Transition {
                    state,
                    action,
                    reward: outcome.reward(learner),
                    next_state: outcome.observation.clone(),
                    terminal,
                });
                state = outcome.observation;
                if terminal {
                    break;
                }
            }

            let count = transitions.len();
            buffer.push_all(transitions);
            Ok(count)
        })
        .collect::<Result<Vec<usize>, CollectError>>()?;

    let total: usize = pushed.iter().sum();
    debug!(episodes, transitions = total, "parallel collection finished");
    Ok(total)
}
