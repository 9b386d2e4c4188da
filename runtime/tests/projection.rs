//! Integration tests for state projection
//!
//! Multi-state folds, ordered cross-state reducers and snapshot seeding.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use fabula_core::event::Event;
use fabula_runtime::{Engine, InMemorySnapshotRepository, StateError};
use fabula_testing::{EngineTest, init_test_tracing};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Game {
    score: i64,
    level: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Leaderboard {
    entries: Vec<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Scored {
    points: i64,
}

impl Event for Scored {
    fn event_type(&self) -> &'static str {
        "score"
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct LevelUp;

impl Event for LevelUp {
    fn event_type(&self) -> &'static str {
        "level_up"
    }
}

fn game_engine() -> Engine {
    let mut engine = Engine::new();
    engine.register_state("game", Game { score: 0, level: 1 });
    engine.register_reducer("game", "score", |_, mut game: Game, e: &Scored| {
        game.score += e.points;
        game
    });
    engine.register_reducer("game", "level_up", |_, mut game: Game, _: &LevelUp| {
        game.level += 1;
        game
    });
    engine
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn several_states_fold_the_same_log() {
    init_test_tracing();
    let mut engine = game_engine();
    engine.register_state("leaderboard", Leaderboard::default());
    engine.register_reducer("leaderboard", "score", |_, mut board: Leaderboard, e: &Scored| {
        board.entries.push(e.points);
        board
    });

    engine.submit(Scored { points: 5 });
    engine.submit(LevelUp);
    engine.submit(Scored { points: 7 });

    assert_eq!(engine.state::<Game>("game"), Some(Game { score: 12, level: 2 }));
    assert_eq!(engine.state::<Leaderboard>("leaderboard"), Some(Leaderboard { entries: vec![5, 7] }));
    let mut names = engine.state_names();
    names.sort_unstable();
    assert_eq!(names, vec!["game", "leaderboard"]);
}

#[test]
fn unregistered_state_and_wrong_type() {
    init_test_tracing();
    let engine = game_engine();

    assert!(engine.project("nope").is_none());
    assert_eq!(engine.typed_state::<Game>("nope"), Err(StateError::NotFound("nope".to_string())));
    let error = engine.typed_state::<Leaderboard>("game").unwrap_err();
    assert!(error.to_string().starts_with("state game has wrong type"));
}

#[test]
fn reducers_can_read_other_states() {
    init_test_tracing();
    let mut engine = game_engine();
    engine.register_state("bonus", 0_i64);
    // Each level up adds the game score, projected over the whole log.
    engine.register_reducer("bonus", "level_up", |engine: &Engine, bonus: i64, _: &LevelUp| {
        bonus + engine.state::<Game>("game").map_or(0, |g| g.score)
    });

    engine.submit(Scored { points: 10 });
    engine.submit(LevelUp);

    assert_eq!(engine.state::<i64>("bonus"), Some(10));
}

#[test]
fn ordered_reducers_coordinate_states_by_priority() {
    init_test_tracing();
    let mut engine = game_engine();
    engine.register_state("leaderboard", Leaderboard::default());
    engine.register_ordered_reducer("score", "leaderboard", 20, |_, mut board: Leaderboard, e: &Scored| {
        board.entries.push(e.points * 100);
        board
    });
    engine.register_ordered_reducer("score", "leaderboard", 10, |_, mut board: Leaderboard, e: &Scored| {
        board.entries.push(e.points);
        board
    });
    engine.register_ordered_reducer("score", "game", 0, |_, mut game: Game, e: &Scored| {
        game.score += e.points * 2;
        game
    });

    engine.submit(Scored { points: 3 });

    assert_eq!(engine.state::<Leaderboard>("leaderboard"), Some(Leaderboard { entries: vec![3, 300] }));
    // The unordered `+= points` reducer for "game" is replaced.
    assert_eq!(engine.state::<Game>("game"), Some(Game { score: 6, level: 1 }));
}

#[test]
fn snapshot_seeds_partial_state() {
    init_test_tracing();
    let mut engine = game_engine().with_repository(InMemorySnapshotRepository::new());
    engine
        .set_snapshot("game", &serde_json::json!({ "score": 100 }))
        .unwrap();

    engine.submit(Scored { points: 10 });
    engine.submit(Scored { points: 10 });

    assert_eq!(engine.state::<Game>("game"), Some(Game { score: 120, level: 1 }));
}

#[test]
fn malformed_snapshot_falls_back_to_initial() {
    use fabula_core::repository::{Repository, SnapshotRepository};

    init_test_tracing();
    let mut repository = InMemorySnapshotRepository::new();
    repository.set_snapshot("game", b"{not json".to_vec()).unwrap();
    repository.add(std::sync::Arc::new(Scored { points: 4 })).unwrap();
    let engine = game_engine().with_repository(repository);

    assert_eq!(engine.state::<Game>("game"), Some(Game { score: 4, level: 1 }));
}

#[test]
fn snapshot_calls_fail_without_snapshot_support() {
    init_test_tracing();
    let mut engine = game_engine();

    let set = engine.set_snapshot("game", &Game::default()).unwrap_err();
    let clear = engine.clear_snapshot("game").unwrap_err();

    assert!(set.to_string().contains("does not support snapshots"));
    assert!(clear.to_string().contains("does not support snapshots"));
    assert!(!engine.has_snapshot("game"));
}

#[test]
fn level_gate_with_engine_test() {
    use fabula_runtime::validator_fn;

    init_test_tracing();
    let mut engine = game_engine();
    engine.register_validator(
        "level_up",
        validator_fn(|engine: &Engine, _: &LevelUp| engine.state::<Game>("game").is_some_and(|g| g.score >= 50)),
    );

    EngineTest::new(engine)
        .given(vec![Scored { points: 30 }, Scored { points: 25 }])
        .when(LevelUp)
        .then_accepted()
        .then_state("game", |game: &Game| assert_eq!(game, &Game { score: 55, level: 2 }))
        .run();
}

proptest! {
    #[test]
    fn projection_is_idempotent(points in proptest::collection::vec(-1000_i64..1000, 0..40)) {
        let mut engine = game_engine();
        for p in &points {
            engine.submit(Scored { points: *p });
        }

        let first = engine.state::<Game>("game");
        let second = engine.state::<Game>("game");
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.map(|g| g.score), Some(points.iter().sum::<i64>()));
    }
}
