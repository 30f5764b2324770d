use std::collections::HashSet;

use snake_duel::game::{Engine, EngineError, Phase, Snapshot, SnakeState, Winner};
use snake_duel::game::config::{GameConfig, Player};
use snake_duel::game::grid::{Cell, Direction};
use snake_duel::game::policy::{Policy, Wander};

fn engine(config: GameConfig) -> Engine {
    let mut engine = Engine::new(config.with_seed(17)).unwrap();
    engine.reset();
    engine
}

fn snake(body: &[Cell], direction: Direction) -> Option<SnakeState> {
    Some(SnakeState { body: body.to_vec(), direction })
}

fn running(one: Option<SnakeState>, two: Option<SnakeState>, food: Cell) -> Snapshot {
    Snapshot {
        snakes: [one, two],
        food: Some(food),
        scores: [0, 0],
        steps: 0,
        phase: Phase::Running,
    }
}

#[test]
fn test_stepping_before_reset_is_an_error() {
    let mut engine = Engine::new(GameConfig::solo(10, 10)).unwrap();
    assert_eq!(engine.step([None, None]), Err(EngineError::NotReset));
}

#[test]
fn test_eating_grows_and_respawns_food() {
    let mut engine = engine(GameConfig::solo(10, 10));
    engine.restore(&running(snake(&[(5, 5)], Direction::Right), None, (6, 5))).unwrap();

    let outcome = engine.step([None, None]).unwrap();
    assert!(!outcome.terminal);

    let head = engine.snake(Player::One).unwrap();
    assert_eq!(head.head(), (6, 5));
    assert_eq!(head.len(), 2);
    assert_eq!(engine.score(Player::One), 1);

    let food = engine.food().unwrap();
    assert!(food != (5, 5) && food != (6, 5));
}

#[test]
fn test_reversal_request_is_ignored() {
    let mut engine = engine(GameConfig::solo(10, 10));
    engine.restore(&running(snake(&[(5, 5), (4, 5)], Direction::Right), None, (0, 0))).unwrap();

    engine.step([Some(Direction::Left), None]).unwrap();
    let snake = engine.snake(Player::One).unwrap();
    assert_eq!(snake.direction(), Direction::Right);
    assert_eq!(snake.head(), (6, 5));
}

#[test]
fn test_moving_onto_opponent_head_is_a_draw() {
    let mut engine = engine(GameConfig::duel(10, 10));
    engine.restore(&running(
        snake(&[(4, 5)], Direction::Right),
        snake(&[(5, 5), (6, 5)], Direction::Up),
        (0, 0),
    )).unwrap();

    let outcome = engine.step([None, None]).unwrap();
    assert!(outcome.terminal);
    assert_eq!(outcome.winner, Some(Winner::Draw));
    assert!(outcome.reward(Player::One) < 0.0);
    assert!(outcome.reward(Player::Two) < 0.0);
}

#[test]
fn test_self_collision_hands_the_win_to_the_other_snake() {
    let mut engine = engine(GameConfig::duel(10, 10));
    engine.restore(&running(
        snake(&[(5, 5), (5, 6), (4, 6), (4, 5), (4, 4)], Direction::Left),
        snake(&[(8, 1)], Direction::Up),
        (0, 9),
    )).unwrap();

    let outcome = engine.step([None, None]).unwrap();
    assert!(outcome.terminal);
    assert_eq!(outcome.winner, Some(Winner::Two));
    assert!(outcome.reward(Player::One) < 0.0);
    assert!(outcome.reward(Player::Two) > 0.0);
    assert_eq!(engine.snapshot().winner(), Some(Winner::Two));
}

#[test]
fn test_self_collision_outranks_hitting_the_opponent() {
    let mut engine = engine(GameConfig::duel(10, 10));
    // One turns into its own body while Two runs into One's neck
    engine.restore(&running(
        snake(&[(5, 5), (5, 6), (4, 6), (4, 5), (4, 4)], Direction::Left),
        snake(&[(5, 7), (5, 8)], Direction::Up),
        (0, 9),
    )).unwrap();

    let outcome = engine.step([None, None]).unwrap();
    assert!(outcome.terminal);
    assert_eq!(outcome.winner, Some(Winner::Two));
    assert!(outcome.reward(Player::One) < 0.0);
    assert!(outcome.reward(Player::Two) > 0.0);
}

#[test]
fn test_equal_new_heads_are_a_draw() {
    let mut engine = engine(GameConfig::duel(10, 10));
    engine.restore(&running(
        snake(&[(3, 5)], Direction::Right),
        snake(&[(5, 5)], Direction::Left),
        (0, 0),
    )).unwrap();

    let outcome = engine.step([None, None]).unwrap();
    assert!(outcome.terminal);
    assert_eq!(outcome.winner, Some(Winner::Draw));
    assert!(outcome.reward(Player::One) < 0.0);
    assert!(outcome.reward(Player::Two) < 0.0);
}

#[test]
fn test_starvation_goes_to_the_higher_score() {
    let mut engine = engine(GameConfig::duel(10, 10));
    let mut position = running(
        snake(&[(1, 1)], Direction::Right),
        snake(&[(1, 8)], Direction::Right),
        (5, 5),
    );
    position.scores = [2, 1];
    position.steps = 100 * (2 + 1 + 1);
    engine.restore(&position).unwrap();

    let outcome = engine.step([None, None]).unwrap();
    assert!(outcome.terminal);
    assert_eq!(outcome.winner, Some(Winner::One));
}

#[test]
fn test_starvation_with_equal_scores_is_a_draw() {
    let mut engine = engine(GameConfig::duel(10, 10));
    let mut position = running(
        snake(&[(1, 1)], Direction::Right),
        snake(&[(1, 8)], Direction::Right),
        (5, 5),
    );
    position.scores = [1, 1];
    position.steps = 100 * (1 + 1 + 1);
    engine.restore(&position).unwrap();

    assert_eq!(engine.step([None, None]).unwrap().winner, Some(Winner::Draw));
}

#[test]
fn test_terminal_engine_stays_put_until_reset() {
    let mut engine = engine(GameConfig::duel(10, 10));
    engine.restore(&running(
        snake(&[(4, 5)], Direction::Right),
        snake(&[(5, 5), (6, 5)], Direction::Up),
        (0, 0),
    )).unwrap();
    engine.step([None, None]).unwrap();
    let frozen = engine.snapshot();

    let again = engine.step([Some(Direction::Up), Some(Direction::Left)]).unwrap();
    assert!(again.terminal);
    assert_eq!(again.rewards, [0.0, 0.0]);
    assert_eq!(engine.snapshot(), frozen);

    engine.reset();
    assert!(!engine.is_terminal());
    assert_eq!(engine.steps(), 0);
}

#[test]
fn test_random_play_keeps_bodies_and_food_consistent() {
    let mut engine = engine(GameConfig::duel(12, 12));
    let mut one = Wander::new(0.3, Some(1));
    let mut two = Wander::new(0.3, Some(2));

    for _ in 0..20 {
        engine.reset();
        while !engine.is_terminal() {
            let moves = {
                let board = engine.board();
                [one.choose(&board, Player::One), two.choose(&board, Player::Two)]
            };
            let outcome = engine.step(moves).unwrap();
            if outcome.terminal {
                break;
            }

            let mut cells = HashSet::new();
            for player in [Player::One, Player::Two] {
                for &cell in engine.snake(player).unwrap().body() {
                    assert!(cells.insert(cell), "cell {:?} occupied twice", cell);
                }
            }
            if let Some(food) = engine.food() {
                assert!(!cells.contains(&food), "food spawned inside a body");
            }
        }
    }
}

#[test]
fn test_snapshot_round_trips_through_restore() {
    let mut source = engine(GameConfig::duel(10, 10));
    for _ in 0..5 {
        source.step([Some(Direction::Down), None]).unwrap();
    }
    let snapshot = source.snapshot();

    let mut copy = engine(GameConfig::duel(10, 10));
    let observation = copy.restore(&snapshot).unwrap();
    assert_eq!(copy.snapshot(), snapshot);
    assert_eq!(observation, source.observe());
}
