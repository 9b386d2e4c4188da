//! In-memory repositories.
//!
//! [`InMemoryRepository`] is the engine's default log. It does not store
//! snapshots, so snapshot calls on an engine using it report
//! "snapshots not supported". [`InMemorySnapshotRepository`] adds snapshot
//! storage, which is handy for seeding specific states in tests without
//! replaying many events.

use fabula_core::event::EventRef;
use fabula_core::repository::{Repository, RepositoryError, SnapshotRepository};
use std::collections::HashMap;

/// Event log held in a `Vec`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRepository {
    events: Vec<EventRef>,
}

impl InMemoryRepository {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for InMemoryRepository {
    fn add(&mut self, event: EventRef) -> Result<(), RepositoryError> {
        self.events.push(event);
        Ok(())
    }

    fn all(&self) -> Vec<EventRef> {
        self.events.clone()
    }

    fn set_all(&mut self, events: Vec<EventRef>) -> Result<(), RepositoryError> {
        self.events = events;
        Ok(())
    }

    fn len(&self) -> usize {
        self.events.len()
    }
}

/// Event log plus per-state snapshots, all in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemorySnapshotRepository {
    events: Vec<EventRef>,
    snapshots: HashMap<String, Vec<u8>>,
}

impl InMemorySnapshotRepository {
    /// Create an empty log with no snapshots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for InMemorySnapshotRepository {
    fn add(&mut self, event: EventRef) -> Result<(), RepositoryError> {
        self.events.push(event);
        Ok(())
    }

    fn all(&self) -> Vec<EventRef> {
        self.events.clone()
    }

    fn set_all(&mut self, events: Vec<EventRef>) -> Result<(), RepositoryError> {
        self.events = events;
        Ok(())
    }

    fn len(&self) -> usize {
        self.events.len()
    }

    fn snapshots(&self) -> Option<&dyn SnapshotRepository> {
        Some(self)
    }

    fn snapshots_mut(&mut self) -> Option<&mut dyn SnapshotRepository> {
        Some(self)
    }
}

impl SnapshotRepository for InMemorySnapshotRepository {
    fn snapshot(&self, state_name: &str) -> Option<Vec<u8>> {
        self.snapshots.get(state_name).cloned()
    }

    fn set_snapshot(&mut self, state_name: &str, data: Vec<u8>) -> Result<(), RepositoryError> {
        self.snapshots.insert(state_name.to_string(), data);
        Ok(())
    }

    fn clear_snapshot(&mut self, state_name: &str) -> Result<(), RepositoryError> {
        self.snapshots.remove(state_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;
    use fabula_core::event::{Event, IntoEventRef};
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct Simple {
        value: i32,
    }

    impl Event for Simple {
        fn event_type(&self) -> &'static str {
            "simple"
        }
    }

    #[test]
    fn add_keeps_commit_order() {
        let mut repository = InMemoryRepository::new();
        repository.add(Simple { value: 1 }.into_event_ref()).unwrap();
        repository.add(Simple { value: 2 }.into_event_ref()).unwrap();

        let values: Vec<_> = repository
            .all()
            .iter()
            .filter_map(|e| e.downcast_ref::<Simple>().map(|s| s.value))
            .collect();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(repository.len(), 2);
    }

    #[test]
    fn set_all_replaces_log() {
        let mut repository = InMemoryRepository::new();
        repository.add(Simple { value: 1 }.into_event_ref()).unwrap();
        repository
            .set_all(vec![Simple { value: 10 }.into_event_ref(), Simple { value: 20 }.into_event_ref()])
            .unwrap();

        assert_eq!(repository.len(), 2);
        assert!(!repository.is_empty());
    }

    #[test]
    fn plain_repository_has_no_snapshots() {
        let mut repository = InMemoryRepository::new();
        assert!(repository.snapshots().is_none());
        assert!(repository.snapshots_mut().is_none());
    }

    #[test]
    fn snapshot_lifecycle() {
        let mut repository = InMemorySnapshotRepository::new();
        assert!(repository.snapshot("game").is_none());

        repository.set_snapshot("game", br#"{"score":100}"#.to_vec()).unwrap();
        assert_eq!(repository.snapshot("game"), Some(br#"{"score":100}"#.to_vec()));
        assert!(repository.snapshots().is_some());

        repository.clear_snapshot("game").unwrap();
        assert!(repository.snapshot("game").is_none());
        repository.clear_snapshot("game").unwrap();
    }
}
