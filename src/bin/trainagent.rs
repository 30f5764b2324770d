use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Serialize, Deserialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use snake_duel::agent::{collect_parallel, training_schedule, Agent, AgentConfig, EvalRecord};
use snake_duel::agent::replaybuffer::{ReplayBuffer, SharedReplayBuffer};
use snake_duel::game::Engine;
use snake_duel::game::config::{GameConfig, Mode};
use snake_duel::game::policy::PolicyKind;

#[derive(Parser)]
#[command(name = "trainagent")]
#[command(version, about = "Train a DQN snake against a scripted opponent")]
struct Cli {
    /// JSON file with `game` and `agent` sections; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1000)]
    episodes: usize,

    #[arg(long)]
    mode: Option<ModeArg>,

    #[arg(long)]
    width: Option<i32>,

    #[arg(long)]
    height: Option<i32>,

    /// Scripted policy driving the other snake in duel mode
    #[arg(long, default_value_t = PolicyKind::Idle)]
    opponent: PolicyKind,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "checkpoints/snake_agent.bin")]
    checkpoint: PathBuf,

    /// Continue from `--checkpoint` if it loads
    #[arg(long)]
    resume: bool,

    /// Episodes between checkpoints
    #[arg(long, default_value_t = 100)]
    save_interval: usize,

    /// Per-episode CSV log
    #[arg(long, default_value = "checkpoints/episodes.csv")]
    log: PathBuf,

    /// Episodes played in parallel to fill the replay buffer before training
    #[arg(long, default_value_t = 0)]
    warmup_episodes: usize,

    /// Episodes between greedy evaluations; 0 disables them
    #[arg(long, default_value_t = 50)]
    eval_interval: usize,

    /// Greedy episodes played per evaluation
    #[arg(long, default_value_t = 10)]
    eval_episodes: usize,

    /// Evaluation history CSV
    #[arg(long, default_value = "checkpoints/evaluations.csv")]
    eval_log: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Solo,
    Duel,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RunConfig {
    game: GameConfig,
    agent: AgentConfig,
}

impl RunConfig {
    fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        serde_json::from_reader(file).with_context(|| format!("parsing config {}", path.display()))
    }

    fn apply(&mut self, cli: &Cli) {
        if let Some(mode) = cli.mode {
            self.game.mode = match mode {
                ModeArg::Solo => Mode::Solo,
                ModeArg::Duel => Mode::Duel,
            };
        }
        if let Some(width) = cli.width {
            self.game.width = width;
        }
        if let Some(height) = cli.height {
            self.game.height = height;
        }
        if let Some(seed) = cli.seed {
            self.game.seed = Some(seed);
            self.agent.seed = Some(seed);
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut run = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    run.apply(&cli);
    info!(game = ?run.game, agent = ?run.agent, "starting training");

    let mut engine = Engine::new(run.game.clone()).context("invalid game configuration")?;
    let state_len = engine.observation_len();
    let mut agent = if cli.resume {
        Agent::load_or_fresh(&cli.checkpoint, state_len, run.agent.clone())?
    } else {
        Agent::new(state_len, run.agent.clone())?
    };
    let mut opponent = cli.opponent.build(run.game.seed);

    if cli.warmup_episodes > 0 {
        warm_up(&mut agent, &run, &cli)?;
    }

    let mut log = csv_writer(&cli.log)?;
    let eval_interval = if cli.eval_episodes == 0 { 0 } else { cli.eval_interval };
    let mut eval_log = match eval_interval {
        0 => None,
        _ => Some(csv_writer(&cli.eval_log)?),
    };

    for pause in training_schedule(cli.episodes, cli.save_interval, eval_interval) {
        let reports = agent.train(&mut engine, opponent.as_mut(), pause.episodes)?;
        for report in &reports {
            log.serialize(report)?;
        }
        log.flush()?;

        if pause.evaluate {
            let mean_reward = agent.evaluate(&mut engine, opponent.as_mut(), cli.eval_episodes)?;
            let record = EvalRecord { episode: agent.episodes(), mean_reward };
            info!(episode = record.episode, mean_reward, "greedy evaluation");
            if let Some(eval_log) = eval_log.as_mut() {
                eval_log.serialize(record)?;
                eval_log.flush()?;
            }
        }
        if pause.save {
            agent.save(&cli.checkpoint)
                .with_context(|| format!("saving checkpoint to {}", cli.checkpoint.display()))?;
        }
    }

    info!(
        episodes = agent.episodes(),
        updates = agent.step_count(),
        epsilon = agent.epsilon(),
        checkpoint = %cli.checkpoint.display(),
        "training finished"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

fn csv_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    csv::Writer::from_path(path).with_context(|| format!("creating log {}", path.display()))
}

// fills the agent's replay buffer from episodes played on the rayon pool
fn warm_up(agent: &mut Agent, run: &RunConfig, cli: &Cli) -> Result<()> {
    let shared = SharedReplayBuffer::new(ReplayBuffer::new(run.agent.buffer_capacity)?);
    let seed = run.game.seed.unwrap_or_else(rand::random);
    let opponent = cli.opponent;

    let pushed = collect_parallel(
        agent.network(),
        agent.epsilon(),
        &run.game,
        cli.warmup_episodes,
        |i| opponent.build(Some(seed.wrapping_add(i as u64))),
        &shared,
        seed,
    )?;

    let buffer = shared.into_inner().map_err(|_| anyhow!("replay buffer is still shared"))?;
    for transition in buffer {
        agent.observe(transition);
    }
    info!(episodes = cli.warmup_episodes, transitions = pushed, "replay buffer warmed up");
    Ok(())
}
