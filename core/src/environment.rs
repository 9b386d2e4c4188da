//! Environment traits injected into the engine.
//!
//! Validators and listeners must not reach for the system clock or a global
//! random generator directly, or replaying a log becomes non-deterministic in
//! tests. They ask the engine instead, which forwards to these traits.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use fabula_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let before = clock.now();
/// assert!(clock.now() >= before);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of randomness for game and business rules.
pub trait RandomSource: Send + Sync {
    /// A uniformly distributed integer in `0..upper`.
    ///
    /// Returns `0` when `upper` is `0`.
    fn gen_below(&self, upper: usize) -> usize;

    /// A uniformly distributed float in `0.0..1.0`.
    fn gen_unit(&self) -> f64;
}

/// Production randomness backed by the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn gen_below(&self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..upper)
    }

    fn gen_unit(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..1.0)
    }
}
