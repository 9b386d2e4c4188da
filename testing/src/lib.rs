//! # Fabula Testing
//!
//! Testing utilities and helpers for the Fabula event-sourcing rule engine.
//!
//! This crate provides:
//! - Deterministic environment doubles ([`FixedClock`], [`ScriptedRandom`])
//! - A repository that fails on demand ([`FailingRepository`])
//! - A listener that records what it saw ([`RecordingListener`])
//! - A Given-When-Then harness for engines ([`EngineTest`])
//! - Test logging setup ([`init_test_tracing`])
//!
//! ## Example
//!
//! ```
//! use fabula_core::event::Event;
//! use fabula_runtime::Engine;
//! use fabula_testing::{EngineTest, test_clock};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Clone, Debug, Default, Serialize, Deserialize)]
//! struct Counter { count: i64 }
//!
//! #[derive(Debug, Serialize)]
//! struct Added { value: i64 }
//!
//! impl Event for Added {
//!     fn event_type(&self) -> &'static str { "add" }
//! }
//!
//! let mut engine = Engine::new().with_clock(Arc::new(test_clock()));
//! engine.register_state("counter", Counter::default());
//! engine.register_reducer("counter", "add", |_, mut c: Counter, e: &Added| {
//!     c.count += e.value;
//!     c
//! });
//!
//! EngineTest::new(engine)
//!     .given(vec![Added { value: 3 }])
//!     .when(Added { value: 4 })
//!     .then_accepted()
//!     .then_state("counter", |c: &Counter| assert_eq!(c.count, 7))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use fabula_core::environment::{Clock, RandomSource};


/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, RandomSource, Utc};
    use fabula_core::event::{DynEvent, Event, EventRef};
    use fabula_core::repository::{Repository, RepositoryError};
    use fabula_runtime::{Engine, InMemoryRepository, Listener};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use fabula_testing::mocks::FixedClock;
    /// use fabula_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Random source replaying a fixed script.
    ///
    /// `gen_below(n)` returns the next scripted value modulo `n`; `gen_unit`
    /// returns it divided by `u32::MAX` (clamped below 1). The script wraps
    /// around when exhausted; an empty script always yields zero.
    #[derive(Debug, Default)]
    pub struct ScriptedRandom {
        values: Vec<u32>,
        cursor: AtomicUsize,
    }

    impl ScriptedRandom {
        /// Create a source replaying `values` in order.
        #[must_use]
        pub fn new(values: Vec<u32>) -> Self {
            Self {
                values,
                cursor: AtomicUsize::new(0),
            }
        }

        fn next(&self) -> u32 {
            if self.values.is_empty() {
                return 0;
            }
            let index = self.cursor.fetch_add(1, Ordering::SeqCst) % self.values.len();
            self.values[index]
        }
    }

    impl RandomSource for ScriptedRandom {
        fn gen_below(&self, upper: usize) -> usize {
            if upper == 0 {
                return 0;
            }
            self.next() as usize % upper
        }

        fn gen_unit(&self) -> f64 {
            let unit = f64::from(self.next()) / f64::from(u32::MAX);
            unit.min(1.0 - f64::EPSILON)
        }
    }

    /// Repository that refuses selected writes.
    ///
    /// Appends of the configured event types fail with
    /// [`RepositoryError::Storage`]; everything else goes to an in-memory log.
    /// Replacing the whole log can be made to fail as well.
    #[derive(Debug, Default)]
    pub struct FailingRepository {
        inner: InMemoryRepository,
        failing_types: Vec<&'static str>,
        fail_restore: bool,
    }

    impl FailingRepository {
        /// Create a repository that accepts everything.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Refuse appends of `event_type`.
        #[must_use]
        pub fn failing_on(mut self, event_type: &'static str) -> Self {
            self.failing_types.push(event_type);
            self
        }

        /// Refuse `set_all`.
        #[must_use]
        pub const fn failing_restore(mut self) -> Self {
            self.fail_restore = true;
            self
        }
    }

    impl Repository for FailingRepository {
        fn add(&mut self, event: EventRef) -> Result<(), RepositoryError> {
            if self.failing_types.contains(&event.event_type()) {
                return Err(RepositoryError::Storage(format!(
                    "refusing {}",
                    event.event_type()
                )));
            }
            self.inner.add(event)
        }

        fn all(&self) -> Vec<EventRef> {
            self.inner.all()
        }

        fn set_all(&mut self, events: Vec<EventRef>) -> Result<(), RepositoryError> {
            if self.fail_restore {
                return Err(RepositoryError::Storage("restore refused".to_string()));
            }
            self.inner.set_all(events)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    /// Listener that records the type of every event it handles.
    ///
    /// Clones share the same record, so one clone can be registered while
    /// the test keeps another to inspect.
    #[derive(Clone, Debug, Default)]
    pub struct RecordingListener {
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RecordingListener {
        /// Create a listener with an empty record.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Event types handled so far, in order.
        #[must_use]
        pub fn seen(&self) -> Vec<&'static str> {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of events handled so far.
        #[must_use]
        pub fn count(&self) -> usize {
            self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
    }

    impl Listener for RecordingListener {
        fn handle(&self, _engine: &mut Engine, event: &dyn DynEvent) {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.event_type());
        }
    }
}

/// Install a `tracing` subscriber for tests.
///
/// Honors `RUST_LOG`; output goes through the test harness so it is only
/// shown for failing tests. Safe to call from every test.
pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

// Re-export commonly used items
pub use engine_test::EngineTest;
pub use mocks::{FailingRepository, FixedClock, RecordingListener, ScriptedRandom, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(time1.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn scripted_random_replays_and_wraps() {
        let random = ScriptedRandom::new(vec![7, 2]);
        assert_eq!(random.gen_below(5), 2);
        assert_eq!(random.gen_below(5), 2);
        assert_eq!(random.gen_below(10), 7);
        assert_eq!(random.gen_below(0), 0);
    }

    #[test]
    fn scripted_random_unit_stays_below_one() {
        let random = ScriptedRandom::new(vec![0, u32::MAX]);
        assert!(random.gen_unit().abs() < f64::EPSILON);
        assert!(random.gen_unit() < 1.0);
        assert_eq!(ScriptedRandom::default().gen_below(3), 0);
    }

    #[test]
    fn tracing_init_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }
}
