//! # Fabula Core
//!
//! Core traits and types for the Fabula event-sourcing rule engine.
//!
//! Application logic is expressed as immutable events. An engine (in
//! `fabula-runtime`) validates each submitted event, runs side effects around
//! its commit, and derives named states by folding the log through pure
//! reducers. This crate holds the pieces every other crate agrees on.
//!
//! ## Core Concepts
//!
//! - **Event**: Immutable fact with a stable type name ([`event::Event`])
//! - **Event Log**: Append-only, commit-ordered sequence behind a [`repository::Repository`]
//! - **Snapshot**: Partial seed for a state's initial value ([`repository::SnapshotRepository`])
//! - **Environment**: Injected clock and randomness ([`environment`])
//!
//! ## Example
//!
//! ```
//! use fabula_core::event::{Event, IntoEventRef};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct Added {
//!     value: i64,
//! }
//!
//! impl Event for Added {
//!     fn event_type(&self) -> &'static str {
//!         "add"
//!     }
//! }
//!
//! let event = Added { value: 3 }.into_event_ref();
//! assert_eq!(event.downcast_ref::<Added>().map(|e| e.value), Some(3));
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod environment;
pub mod event;
pub mod repository;

pub use environment::{Clock, RandomSource, SystemClock, ThreadRandom};
pub use event::{DynEvent, Event, EventEnvelope, EventError, EventRef, IntoEventRef, Timestamped};
pub use repository::{Repository, RepositoryError, SnapshotRepository};
