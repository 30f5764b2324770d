use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snake_duel::agent::{Agent, AgentConfig, Tally};
use snake_duel::game::Engine;
use snake_duel::game::config::GameConfig;
use snake_duel::game::policy::PolicyKind;

/// Plays a trained snake against a scripted one and keeps score.
#[derive(Parser)]
#[command(name = "duel")]
#[command(version, about = "Pit a trained snake against a scripted opponent")]
struct Cli {
    #[arg(long, default_value = "checkpoints/snake_agent.bin")]
    checkpoint: PathBuf,

    #[arg(long, default_value_t = 10)]
    matches: usize,

    #[arg(long, default_value_t = 36)]
    width: i32,

    #[arg(long, default_value_t = 36)]
    height: i32,

    #[arg(long, default_value_t = PolicyKind::Greedy)]
    opponent: PolicyKind,

    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    let cli = Cli::parse();

    let mut game = GameConfig::duel(cli.width, cli.height);
    game.seed = cli.seed;
    let mut engine = Engine::new(game).context("invalid board size")?;
    let learner = engine.learner();

    let config = AgentConfig { seed: cli.seed, ..AgentConfig::default() };
    let mut agent = Agent::load_or_fresh(&cli.checkpoint, engine.observation_len(), config)?;
    let mut opponent = cli.opponent.build(cli.seed);

    let mut tally = Tally::default();
    for round in 1..=cli.matches {
        let report = agent.run_episode(&mut engine, opponent.as_mut(), false)?;
        tally.record(report.winner, learner);
        info!(
            round,
            winner = ?report.winner,
            steps = report.steps,
            score_one = report.score_one,
            score_two = report.score_two,
            wins = tally.wins,
            losses = tally.losses,
            draws = tally.draws,
            "match finished"
        );
    }

    println!(
        "{} matches vs {}: {} won, {} lost, {} drawn",
        tally.played(),
        cli.opponent,
        tally.wins,
        tally.losses,
        tally.draws
    );
    Ok(())
}
