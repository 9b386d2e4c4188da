//! Repository trait and related types for event storage.
//!
//! A repository is the engine's only contact with a storage medium: an
//! ordered, append-only log of events plus an optional snapshot store.
//! State projection reads the log through this trait, so it never depends
//! on where events actually live.
//!
//! # Design
//!
//! The contract is deliberately small:
//!
//! - [`Repository::add`] appends one committed event
//! - [`Repository::all`] returns the log in commit order
//! - [`Repository::set_all`] atomically replaces the whole log (rebuild/restore)
//!
//! Snapshot support is opt-in. A repository that also stores snapshots
//! implements [`SnapshotRepository`] and exposes it through
//! [`Repository::snapshots`] / [`Repository::snapshots_mut`]; the default
//! implementations return `None`, which the engine reports as
//! "snapshots not supported".
//!
//! # Implementations
//!
//! - `InMemoryRepository` / `InMemorySnapshotRepository` (in `fabula-runtime`)
//! - `FailingRepository` (in `fabula-testing`): commit failures on demand
//!
//! # Guarantees
//!
//! The engine provides none beyond what the repository provides. Durability,
//! multi-writer safety and delivery guarantees belong to the implementation.

use crate::event::EventRef;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backing store refused or failed the write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Snapshot storage failed.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Ordered, append-only event storage.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so an engine owning one can be moved
/// across threads. The engine never calls a repository concurrently.
pub trait Repository: Send + Sync {
    /// Commit a new event at the end of the log.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if the event could not be stored. The
    /// engine treats this as a rejection of the event.
    fn add(&mut self, event: EventRef) -> Result<(), RepositoryError>;

    /// Return every event in commit order.
    fn all(&self) -> Vec<EventRef>;

    /// Atomically replace the whole log.
    ///
    /// Used only for rebuilding or restoring from a persisted stream.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if the log could not be replaced. On error
    /// the previous log must be left untouched.
    fn set_all(&mut self, events: Vec<EventRef>) -> Result<(), RepositoryError>;

    /// Number of committed events.
    fn len(&self) -> usize {
        self.all().len()
    }

    /// Whether the log is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot capability, if this repository supports it.
    fn snapshots(&self) -> Option<&dyn SnapshotRepository> {
        None
    }

    /// Mutable snapshot capability, if this repository supports it.
    fn snapshots_mut(&mut self) -> Option<&mut dyn SnapshotRepository> {
        None
    }
}

/// Per-state snapshot storage.
///
/// A snapshot is an opaque, partial JSON object associated with a state
/// name. It seeds the initial value of that state's projection; it never
/// filters or truncates the event log.
pub trait SnapshotRepository: Send + Sync {
    /// Return the snapshot bytes for a state, or `None` if none exists.
    fn snapshot(&self, state_name: &str) -> Option<Vec<u8>>;

    /// Store a snapshot for a state, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Snapshot`] if the snapshot could not be stored.
    fn set_snapshot(&mut self, state_name: &str, data: Vec<u8>) -> Result<(), RepositoryError>;

    /// Remove the snapshot for a state. Removing a missing snapshot is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Snapshot`] if the snapshot could not be removed.
    fn clear_snapshot(&mut self, state_name: &str) -> Result<(), RepositoryError>;
}
