//! State projection: named states derived by folding the event log.
//!
//! A state is registered with a name and an initial value. Reducers are
//! attached per `(state, event type)` pair. Projecting a state starts from
//! its initial value (or the snapshot-seeded value) and folds every committed
//! event, in commit order, through the matching reducer.
//!
//! # Ordered reducers
//!
//! When several states must be updated in a coordinated order for the same
//! event type, reducers can instead be registered with a priority. As soon
//! as one ordered reducer exists for an event type, the unordered per-state
//! reducers for that type are no longer consulted: each state applies only
//! the ordered reducers that target it, lowest priority first, ties in
//! registration order.
//!
//! # Caching
//!
//! None. Every projection folds the whole log again; callers that need
//! speed cache externally.

use crate::engine::Engine;
use crate::snapshot::merge_snapshot;
use fabula_core::event::{DynEvent, Event, EventRef};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A projected value, type-erased.
pub type StateValue = Box<dyn Any + Send + Sync>;

/// Erased reducer stored in the projection tables.
pub type ReduceFn = Arc<dyn Fn(&Engine, StateValue, &dyn DynEvent) -> StateValue + Send + Sync>;

/// Requirements on a state type.
///
/// Serialization is needed for snapshot seeding.
pub trait ProjectedState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> ProjectedState for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Errors from typed state access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No state is registered under this name.
    #[error("state {0} not found")]
    NotFound(String),

    /// The state exists but holds another type.
    #[error("state {name} has wrong type, expected {expected}")]
    WrongType {
        /// The state name.
        name: String,
        /// The requested Rust type.
        expected: &'static str,
    },
}

trait StateSlot: Send + Sync {
    fn initial(&self) -> StateValue;
    fn seeded(&self, snapshot: &[u8]) -> StateValue;
    fn type_name(&self) -> &'static str;
}

struct TypedSlot<S> {
    initial: S,
}

impl<S: ProjectedState> StateSlot for TypedSlot<S> {
    fn initial(&self) -> StateValue {
        Box::new(self.initial.clone())
    }

    fn seeded(&self, snapshot: &[u8]) -> StateValue {
        Box::new(merge_snapshot(&self.initial, snapshot))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<S>()
    }
}

struct StateEntry {
    slot: Box<dyn StateSlot>,
    reducers: HashMap<String, ReduceFn>,
}

struct OrderedReducer {
    state: String,
    priority: i32,
    reduce: ReduceFn,
}

/// Engine-owned state and reducer tables.
#[derive(Default)]
pub struct Projector {
    states: HashMap<String, StateEntry>,
    ordered: HashMap<String, Vec<OrderedReducer>>,
}

impl Projector {
    /// Create empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a state and its initial value.
    ///
    /// Replacing a state drops the unordered reducers registered for it.
    pub fn register_state<S: ProjectedState>(&mut self, name: &str, initial: S) {
        self.states.insert(
            name.to_string(),
            StateEntry {
                slot: Box::new(TypedSlot { initial }),
                reducers: HashMap::new(),
            },
        );
    }

    /// Whether a state is registered under `name`.
    #[must_use]
    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Names of all registered states.
    #[must_use]
    pub fn state_names(&self) -> Vec<&str> {
        self.states.keys().map(String::as_str).collect()
    }

    /// Attach the unordered reducer for `(state, event_type)`.
    ///
    /// Returns `false` (and attaches nothing) if the state is not registered.
    pub fn register_reducer(&mut self, state: &str, event_type: &str, reduce: ReduceFn) -> bool {
        let Some(entry) = self.states.get_mut(state) else {
            tracing::warn!(state, event_type, "Reducer registered for unknown state; ignored");
            return false;
        };
        entry.reducers.insert(event_type.to_string(), reduce);
        true
    }

    /// Attach an ordered reducer for `event_type` targeting `state`.
    pub fn register_ordered_reducer(
        &mut self,
        event_type: &str,
        state: &str,
        priority: i32,
        reduce: ReduceFn,
    ) {
        let reducers = self.ordered.entry(event_type.to_string()).or_default();
        let position = reducers.partition_point(|existing| existing.priority <= priority);
        reducers.insert(
            position,
            OrderedReducer {
                state: state.to_string(),
                priority,
                reduce,
            },
        );
    }

    /// Fold the log into the named state.
    ///
    /// `snapshot`, when present, seeds the fold instead of the initial value.
    /// Returns `None` if the state is not registered.
    pub fn project(
        &self,
        engine: &Engine,
        name: &str,
        snapshot: Option<&[u8]>,
        events: &[EventRef],
    ) -> Option<StateValue> {
        let entry = self.states.get(name)?;
        let mut value = match snapshot {
            Some(bytes) => entry.slot.seeded(bytes),
            None => entry.slot.initial(),
        };

        for event in events {
            value = self.apply(engine, name, entry, value, event.as_ref());
        }

        Some(value)
    }

    fn apply(
        &self,
        engine: &Engine,
        name: &str,
        entry: &StateEntry,
        value: StateValue,
        event: &dyn DynEvent,
    ) -> StateValue {
        let event_type = event.event_type();

        if let Some(ordered) = self.ordered.get(event_type) {
            return ordered
                .iter()
                .filter(|reducer| reducer.state == name)
                .fold(value, |value, reducer| (reducer.reduce)(engine, value, event));
        }

        match entry.reducers.get(event_type) {
            Some(reduce) => reduce(engine, value, event),
            None => value,
        }
    }

    /// The Rust type registered for a state, for diagnostics.
    #[must_use]
    pub fn state_type_name(&self, name: &str) -> Option<&'static str> {
        self.states.get(name).map(|entry| entry.slot.type_name())
    }
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector")
            .field("states", &self.states.len())
            .field("ordered_event_types", &self.ordered.len())
            .finish()
    }
}

/// Wrap a typed reducer closure into a [`ReduceFn`].
///
/// If the fold hands the reducer a value of another state type, or an event
/// of another concrete type, the value passes through unchanged.
pub fn typed_reducer<S, E, F>(reduce: F) -> ReduceFn
where
    S: ProjectedState,
    E: Event,
    F: Fn(&Engine, S, &E) -> S + Send + Sync + 'static,
{
    Arc::new(move |engine: &Engine, value: StateValue, event: &dyn DynEvent| {
        let Some(typed_event) = event.downcast_ref::<E>() else {
            tracing::warn!(
                event_type = event.event_type(),
                expected = std::any::type_name::<E>(),
                "Reducer received an event of another type; state unchanged"
            );
            return value;
        };
        match value.downcast::<S>() {
            Ok(state) => Box::new(reduce(engine, *state, typed_event)) as StateValue,
            Err(value) => {
                tracing::warn!(
                    expected = std::any::type_name::<S>(),
                    "Reducer registered for another state type; state unchanged"
                );
                value
            }
        }
    })
}
