//! # Fabula Runtime
//!
//! The engine of the Fabula event-sourcing rule engine.
//!
//! Application behaviour is declared as rules around event types:
//! validators decide whether an event may happen, before-hooks and
//! listeners react to it, and reducers fold the committed log into named
//! states. The engine runs every submitted event through that pipeline and
//! projects state on demand.
//!
//! ## Core Components
//!
//! - **Engine** ([`engine`]): commit pipeline, projection and persistence entry points
//! - **Validation** ([`validation`]): validators and their documented exceptions
//! - **Dispatch** ([`dispatch`]): before-hooks, listeners, conditional and emitting listeners
//! - **Projection** ([`projection`]): named states, reducers and ordered reducers
//! - **Snapshots** ([`snapshot`]): partial-state seeding of projections
//! - **Registry** ([`registry`]): type-name based (de)serialization of the log
//! - **Registration** ([`registration`]): fluent per-event-type rule builder
//!
//! ## Example
//!
//! ```
//! use fabula_core::event::Event;
//! use fabula_runtime::Engine;
//! use fabula_runtime::validation::validator_fn;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct OrderPlaced { amount: i64 }
//!
//! impl Event for OrderPlaced {
//!     fn event_type(&self) -> &'static str { "order" }
//! }
//!
//! let mut engine = Engine::new();
//! engine.register_validator("order", validator_fn(|_, order: &OrderPlaced| order.amount >= 0));
//!
//! assert!(!engine.submit(OrderPlaced { amount: -1 }));
//! assert!(engine.events().is_empty());
//! ```

/// Side effects around the commit of an event
pub mod dispatch;

/// The engine itself
pub mod engine;

/// State projection tables
pub mod projection;

/// Fluent per-event-type registration
pub mod registration;

/// Event type registry and stream (de)serialization
pub mod registry;

/// In-memory repositories
pub mod repository;

/// Named services
pub mod services;

/// Snapshot merge
pub mod snapshot;

/// Validators and exceptions
pub mod validation;

pub use dispatch::{Listener, any_listener, emit, listener_fn, when_valid};
pub use engine::Engine;
pub use error::EngineError;
pub use projection::{ProjectedState, StateError, StateValue};
pub use registry::EventRegistry;
pub use repository::{InMemoryRepository, InMemorySnapshotRepository};
pub use validation::{Validator, ValidatorException, ValidatorId, Verdict, any_validator, validator_fn};

/// Error types for the engine
pub mod error {
    use fabula_core::{EventError, RepositoryError};
    use thiserror::Error;

    /// Errors returned by [`Engine`](crate::Engine) operations.
    ///
    /// Rejection by a validator is not an error for [`Engine::submit`](crate::Engine::submit);
    /// only the `try_submit` family reports it, as [`EngineError::Rejected`].
    #[derive(Error, Debug)]
    pub enum EngineError {
        /// The repository cannot store snapshots.
        #[error("repository does not support snapshots")]
        SnapshotsUnsupported,

        /// A snapshot value could not be encoded as JSON.
        #[error("Snapshot encoding failed for state {state}: {source}")]
        SnapshotEncoding {
            /// The state the snapshot was meant for.
            state: String,
            /// The underlying encoding error.
            #[source]
            source: serde_json::Error,
        },

        /// The repository reported a failure.
        #[error("Repository error: {0}")]
        Repository(#[from] RepositoryError),

        /// The repository refused a wholesale replacement of the log.
        ///
        /// Restoring history is not expected to fail; callers usually treat
        /// this as fatal.
        #[error("Failed to restore event log: {0}")]
        Restore(#[source] RepositoryError),

        /// A submitted event was not committed.
        #[error("failed to {context}: {event_type} event was rejected")]
        Rejected {
            /// Type of the rejected event.
            event_type: String,
            /// What the caller was trying to do.
            context: String,
        },

        /// Encoding or decoding of the event stream failed.
        #[error("Event error: {0}")]
        Event(#[from] EventError),
    }
}
