use snake_duel::agent::{training_schedule, Agent, AgentConfig, EvalRecord};
use snake_duel::agent::approximator::{QFunction, QNetwork};
use snake_duel::agent::replaybuffer::Transition;
use snake_duel::game::Engine;
use snake_duel::game::config::GameConfig;
use snake_duel::game::grid::Direction;
use snake_duel::game::policy::{Greedy, Idle};

fn assert_vec_approx_eq(a: &[f32], b: &[f32]) {
    let tolerance = 1e-6;
    assert_eq!(a.len(), b.len(), "vectors have different lengths");
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!((x - y).abs() < tolerance, "mismatch at index {}: {} vs {}", i, x, y);
    }
}

fn small_config() -> AgentConfig {
    AgentConfig {
        batch_size: 16,
        buffer_capacity: 5_000,
        target_sync_interval: 5,
        epsilon_decay: 0.99,
        epsilon_min: 0.2,
        hidden_layers: vec![16],
        learning_rate: 0.001,
        seed: Some(21),
        ..AgentConfig::default()
    }
}

fn duel_engine() -> Engine {
    Engine::new(GameConfig::duel(10, 10).with_seed(8)).unwrap()
}

#[test]
fn test_epsilon_is_non_increasing_and_floored() {
    let mut engine = duel_engine();
    let mut agent = Agent::new(engine.observation_len(), small_config()).unwrap();

    let reports = agent.train(&mut engine, &mut Greedy, 15).unwrap();
    assert_eq!(reports.len(), 15);

    let epsilons: Vec<f32> = reports.iter().map(|r| r.epsilon).collect();
    for pair in epsilons.windows(2) {
        assert!(pair[1] <= pair[0]);
    }
    assert!(epsilons.iter().all(|&e| e >= 0.2));
    assert!(agent.step_count() > 0);
}

#[test]
fn test_target_changes_only_on_sync_steps() {
    let mut engine = duel_engine();
    let mut agent = Agent::new(engine.observation_len(), small_config()).unwrap();

    // fill the buffer without learning anything yet
    let learner = engine.learner();
    let mut state = engine.reset();
    while agent.buffer().len() < 64 {
        let action = agent.select_action(&state, true);
        let mut moves = [None; 2];
        moves[learner.index()] = Direction::from_index(action);
        let outcome = engine.step(moves).unwrap();
        agent.observe(Transition {
            state,
            action,
            reward: outcome.reward(learner),
            next_state: outcome.observation.clone(),
            terminal: outcome.terminal,
        });
        state = if outcome.terminal { engine.reset() } else { outcome.observation };
    }

    let sample = engine.reset();
    let mut target = agent.network().predict_target(&[sample.as_slice()]).remove(0);
    for _ in 0..23 {
        let before = agent.step_count();
        assert!(agent.train_step().is_some());
        let now = agent.network().predict_target(&[sample.as_slice()]).remove(0);
        if now != target {
            assert_eq!(before % 5, 0, "target changed at step {}", before);
        }
        target = now;
    }
    assert_eq!(agent.step_count(), 23);
}

#[test]
fn test_periodic_evaluation_records_history() {
    let mut engine = duel_engine();
    let mut agent = Agent::new(engine.observation_len(), small_config()).unwrap();

    let mut history = Vec::new();
    let mut trained = 0;
    for pause in training_schedule(7, 0, 3) {
        trained += agent.train(&mut engine, &mut Idle, pause.episodes).unwrap().len();
        if pause.evaluate {
            let mean_reward = agent.evaluate(&mut engine, &mut Idle, 2).unwrap();
            history.push(EvalRecord { episode: agent.episodes(), mean_reward });
        }
    }

    assert_eq!(trained, 7);
    assert_eq!(agent.episodes(), 7);
    let at: Vec<u64> = history.iter().map(|r| r.episode).collect();
    assert_eq!(at, vec![3, 6]);
    assert!(history.iter().all(|r| r.mean_reward.is_finite()));
}

#[test]
fn test_checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.bin");

    let mut engine = duel_engine();
    let state_len = engine.observation_len();
    let mut agent = Agent::new(state_len, small_config()).unwrap();
    agent.train(&mut engine, &mut Idle, 5).unwrap();
    agent.save(&path).unwrap();

    let loaded = Agent::<QNetwork>::load(&path, state_len, small_config()).unwrap();
    assert_eq!(loaded.epsilon(), agent.epsilon());
    assert_eq!(loaded.step_count(), agent.step_count());
    assert_eq!(loaded.episodes(), 5);
    assert!(loaded.buffer().is_empty());

    let sample = engine.reset();
    assert_vec_approx_eq(&loaded.network().predict(&sample), &agent.network().predict(&sample));
    assert_vec_approx_eq(
        &loaded.network().predict_target(&[sample.as_slice()])[0],
        &agent.network().predict_target(&[sample.as_slice()])[0],
    );
}

#[test]
fn test_missing_checkpoint_falls_back_to_fresh_agent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = duel_engine();

    let agent = Agent::load_or_fresh(dir.path().join("absent.bin"), engine.observation_len(), small_config()).unwrap();
    assert_eq!(agent.epsilon(), 1.0);
    assert_eq!(agent.step_count(), 0);
}

#[test]
fn test_checkpoint_for_another_board_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.bin");

    let config = AgentConfig { epsilon_start: 0.5, ..small_config() };
    Agent::new(7, config).unwrap().save(&path).unwrap();

    let engine = duel_engine();
    assert!(Agent::<QNetwork>::load(&path, engine.observation_len(), small_config()).is_err());

    let agent = Agent::load_or_fresh(&path, engine.observation_len(), small_config()).unwrap();
    assert_eq!(agent.network().state_len(), engine.observation_len());
    assert_eq!(agent.epsilon(), 1.0);
}
