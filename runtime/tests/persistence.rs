//! Integration tests for persisting and restoring the event log

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use fabula_core::event::{Event, IntoEventRef};
use fabula_runtime::{Engine, EngineError};
use fabula_testing::{FailingRepository, init_test_tracing};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    count: i64,
    resets: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum CounterEvent {
    Added { value: i64 },
    Reset,
}

impl Event for CounterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Added { .. } => "add",
            Self::Reset => "reset",
        }
    }
}

fn counter_engine() -> Engine {
    let mut engine = Engine::new();
    engine.register_state("counter", Counter::default());
    let _ = engine
        .when("add")
        .updates("counter", |_, mut c: Counter, e: &CounterEvent| {
            if let CounterEvent::Added { value } = e {
                c.count += value;
            }
            c
        })
        .decodes::<CounterEvent>();
    let _ = engine
        .when("reset")
        .updates("counter", |_, c: Counter, _: &CounterEvent| Counter {
            count: 0,
            resets: c.resets + 1,
        })
        .decodes::<CounterEvent>();
    engine
}

fn add(value: i64) -> CounterEvent {
    CounterEvent::Added { value }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn set_events_restores_state() {
    init_test_tracing();
    let mut engine = counter_engine();
    engine
        .set_events(vec![add(10).into_event_ref(), add(20).into_event_ref(), add(30).into_event_ref()])
        .unwrap();

    assert_eq!(engine.state::<Counter>("counter").map(|c| c.count), Some(60));
}

#[test]
fn set_events_bypasses_rules() {
    use fabula_runtime::validator_fn;

    init_test_tracing();
    let mut engine = counter_engine();
    engine.register_validator("add", validator_fn(|_, _: &CounterEvent| false));

    engine.set_events(vec![add(1).into_event_ref()]).unwrap();

    assert_eq!(engine.event_count(), 1);
}

#[test]
fn set_events_failure_is_reported() {
    init_test_tracing();
    let mut engine = counter_engine().with_repository(FailingRepository::new().failing_restore());

    let error = engine.set_events(vec![add(1).into_event_ref()]).unwrap_err();

    assert!(matches!(error, EngineError::Restore(_)));
}

#[test]
fn wire_format_is_a_type_data_array() {
    init_test_tracing();
    let mut engine = counter_engine();
    engine.submit(add(3));
    engine.submit(CounterEvent::Reset);

    let json: serde_json::Value = serde_json::from_slice(&engine.serialize_events().unwrap()).unwrap();

    assert_eq!(
        json,
        serde_json::json!([
            { "type": "add", "data": { "Added": { "value": 3 } } },
            { "type": "reset", "data": "Reset" }
        ])
    );
}

#[test]
fn round_trip_through_a_fresh_engine() {
    init_test_tracing();
    let mut original = counter_engine();
    for event in [add(5), CounterEvent::Reset, add(2), add(4)] {
        original.submit(event);
    }
    let bytes = original.serialize_events().unwrap();

    let mut restored = counter_engine();
    let count = restored.restore_events(&bytes).unwrap();

    assert_eq!(count, 4);
    assert_eq!(restored.state::<Counter>("counter"), original.state::<Counter>("counter"));
    assert_eq!(restored.state::<Counter>("counter"), Some(Counter { count: 6, resets: 1 }));
}

#[test]
fn unregistered_types_are_dropped_on_restore() {
    init_test_tracing();
    let mut restored = Engine::new();
    restored.register_event_type::<CounterEvent>("add");

    let events = restored
        .deserialize_events(br#"[{"type":"reset","data":"Reset"},{"type":"add","data":{"Added":{"value":1}}}]"#)
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type(), "add");
}

#[test]
fn malformed_stream_is_an_error() {
    init_test_tracing();
    let engine = counter_engine();
    assert!(matches!(engine.deserialize_events(b"not json"), Err(EngineError::Event(_))));
}

fn counter_event() -> impl Strategy<Value = CounterEvent> {
    prop_oneof![
        4 => (-100_i64..100).prop_map(add),
        1 => Just(CounterEvent::Reset),
    ]
}

proptest! {
    #[test]
    fn restore_reproduces_projection(events in proptest::collection::vec(counter_event(), 0..30)) {
        let mut original = counter_engine();
        for event in events {
            original.submit(event);
        }

        let mut restored = counter_engine();
        let bytes = original.serialize_events().unwrap();
        restored.restore_events(&bytes).unwrap();

        prop_assert_eq!(restored.event_count(), original.event_count());
        prop_assert_eq!(
            restored.state::<Counter>("counter"),
            original.state::<Counter>("counter")
        );
    }
}
