//! The engine: commit pipeline and state projection over one event log.
//!
//! # Design
//!
//! An [`Engine`] owns everything needed to turn submitted events into
//! committed history and derived state:
//!
//! - the repository holding the log (and, optionally, snapshots),
//! - validator, exception, hook, listener and reducer tables,
//! - the event type registry used to persist and restore the log,
//! - named services and the injected clock and random source.
//!
//! All of it is built at startup and read during operation. The engine is
//! single-writer: [`Engine::submit`] takes `&mut self`, and nested emissions
//! from hooks and listeners are plain recursive calls on the same stack.
//!
//! # Commit pipeline
//!
//! For each submitted event:
//!
//! 1. validators for its type run in registration order (exceptions may skip
//!    individual validators); the first disapproval rejects the event,
//! 2. before-hooks run in registration order,
//! 3. the event is appended to the repository,
//! 4. listeners run in registration order.
//!
//! Rejection is an expected outcome and is reported as `false`, not as an
//! error. If the append fails, listeners do not run and effects of the
//! before-hooks (including events they committed) remain.
//!
//! # Example
//!
//! ```
//! use fabula_core::event::Event;
//! use fabula_runtime::Engine;
//! use serde::{Deserialize, Serialize};
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
//! let mut engine = Engine::new();
//! engine.register_state("counter", Counter::default());
//! engine.register_reducer("counter", "add", |_, mut state: Counter, event: &Added| {
//!     state.count += event.value;
//!     state
//! });
//!
//! assert!(engine.submit(Added { value: 3 }));
//! assert!(engine.submit(Added { value: 4 }));
//! assert_eq!(engine.state::<Counter>("counter").map(|c| c.count), Some(7));
//! ```

use crate::dispatch::{Dispatcher, Listener};
use crate::error::EngineError;
use crate::projection::{ProjectedState, Projector, StateError, StateValue, typed_reducer};
use crate::registration::EventRegistration;
use crate::registry::EventRegistry;
use crate::repository::InMemoryRepository;
use crate::services::Services;
use crate::validation::{ValidationPipeline, Validator, ValidatorException, ValidatorId, Verdict};
use fabula_core::environment::{Clock, RandomSource, SystemClock, ThreadRandom};
use fabula_core::event::{DynEvent, Event, EventRef, IntoEventRef, Timestamped};
use fabula_core::repository::Repository;
use fabula_core::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Event-sourcing rule engine.
pub struct Engine {
    repository: Box<dyn Repository>,
    validation: ValidationPipeline,
    dispatcher: Dispatcher,
    projector: Projector,
    registry: EventRegistry,
    services: Services,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            repository: Box::new(InMemoryRepository::new()),
            validation: ValidationPipeline::new(),
            dispatcher: Dispatcher::new(),
            projector: Projector::new(),
            registry: EventRegistry::new(),
            services: Services::new(),
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
        }
    }
}

impl Engine {
    /// Create an engine over an empty in-memory log, using the system clock
    /// and thread-local randomness.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the repository.
    ///
    /// Whatever the repository already holds becomes the engine's history.
    #[must_use]
    pub fn with_repository(mut self, repository: impl Repository + 'static) -> Self {
        self.repository = Box::new(repository);
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the random source.
    #[must_use]
    pub fn with_random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    // ----- commit pipeline -----

    /// Validate, run side effects for, and commit an event.
    ///
    /// Returns `true` if the event was committed. `false` means a validator
    /// rejected it or the repository refused it.
    pub fn submit(&mut self, event: impl IntoEventRef) -> bool {
        self.submit_ref(event.into_event_ref())
    }

    /// [`submit`](Self::submit) for an already shared event.
    #[tracing::instrument(skip(self, event), fields(event_type = event.event_type()), name = "engine_submit")]
    pub fn submit_ref(&mut self, event: EventRef) -> bool {
        let event_type = event.event_type();

        if let Verdict::Rejected { validator } = self.validation.evaluate(self, event.as_ref()) {
            tracing::debug!(event_type, %validator, "Event rejected");
            return false;
        }

        for hook in self.dispatcher.hooks_for(event_type) {
            tracing::trace!(event_type, "Running before-hook");
            hook.handle(self, event.as_ref());
        }

        if let Err(error) = self.repository.add(Arc::clone(&event)) {
            tracing::warn!(event_type, %error, "Failed to commit event");
            return false;
        }
        tracing::debug!(event_type, "Event committed");

        for listener in self.dispatcher.listeners_for(event_type) {
            tracing::trace!(event_type, "Running listener");
            listener.handle(self, event.as_ref());
        }

        true
    }

    /// Submit an event and turn rejection into an error.
    ///
    /// `context` describes what the caller was trying to do and ends up in
    /// the error message ("failed to {context}").
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Rejected`] if the event was not committed.
    pub fn try_submit(&mut self, event: impl IntoEventRef, context: &str) -> Result<(), EngineError> {
        let event = event.into_event_ref();
        let event_type = event.event_type();
        if self.submit_ref(event) {
            Ok(())
        } else {
            Err(EngineError::Rejected {
                event_type: event_type.to_string(),
                context: context.to_string(),
            })
        }
    }

    /// Stamp the event with the engine clock, then [`try_submit`](Self::try_submit) it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Rejected`] if the event was not committed.
    pub fn submit_stamped<E>(&mut self, mut event: E, context: &str) -> Result<(), EngineError>
    where
        E: Event + Serialize + Timestamped,
    {
        event.stamp(self.clock.now());
        self.try_submit(event, context)
    }

    /// Run the validators for an event without committing it.
    #[must_use]
    pub fn check(&self, event: &dyn DynEvent) -> Verdict {
        self.validation.evaluate(self, event)
    }

    // ----- registration -----

    /// Start a fluent registration for one event type.
    pub fn when(&mut self, event_type: impl Into<String>) -> EventRegistration<'_> {
        EventRegistration::new(self, event_type.into())
    }

    /// Append a validator for `event_type`.
    pub fn register_validator(&mut self, event_type: &str, validator: impl Validator + 'static) -> ValidatorId {
        self.validation.register(event_type, Arc::new(validator))
    }

    /// Attach an exception to the validators of `event_type`.
    pub fn register_exception(&mut self, event_type: &str, exception: ValidatorException) {
        self.validation.register_exception(event_type, exception);
    }

    /// Exceptions registered for `event_type`.
    #[must_use]
    pub fn exceptions(&self, event_type: &str) -> &[ValidatorException] {
        self.validation.exceptions(event_type)
    }

    /// Append a before-hook for `event_type`.
    pub fn register_hook(&mut self, event_type: &str, hook: impl Listener + 'static) {
        self.dispatcher.register_hook(event_type, Arc::new(hook));
    }

    /// Append a post-commit listener for `event_type`.
    pub fn register_listener(&mut self, event_type: &str, listener: impl Listener + 'static) {
        self.dispatcher.register_listener(event_type, Arc::new(listener));
    }

    /// Register (or replace) a named state.
    pub fn register_state<S: ProjectedState>(&mut self, name: &str, initial: S) {
        self.projector.register_state(name, initial);
    }

    /// Attach the reducer applied to state `state` for events of `event_type`.
    ///
    /// Returns `false` if `state` has not been registered.
    pub fn register_reducer<S, E, F>(&mut self, state: &str, event_type: &str, reduce: F) -> bool
    where
        S: ProjectedState,
        E: Event,
        F: Fn(&Engine, S, &E) -> S + Send + Sync + 'static,
    {
        self.projector
            .register_reducer(state, event_type, typed_reducer(reduce))
    }

    /// Attach a reducer for `event_type` that runs in `priority` order
    /// (ascending) with the other ordered reducers of that type.
    pub fn register_ordered_reducer<S, E, F>(
        &mut self,
        event_type: &str,
        state: &str,
        priority: i32,
        reduce: F,
    ) where
        S: ProjectedState,
        E: Event,
        F: Fn(&Engine, S, &E) -> S + Send + Sync + 'static,
    {
        self.projector
            .register_ordered_reducer(event_type, state, priority, typed_reducer(reduce));
    }

    /// Make events of type `E` restorable under `name`.
    pub fn register_event_type<E>(&mut self, name: impl Into<String>)
    where
        E: Event + Serialize + DeserializeOwned,
    {
        self.registry.register::<E>(name);
    }

    /// Register (or replace) a named service.
    pub fn register_service<T: Any + Send + Sync>(&mut self, name: impl Into<String>, service: T) {
        self.services.register(name, service);
    }

    /// Look up a service by name and type.
    #[must_use]
    pub fn service<T: Any>(&self, name: &str) -> Option<&T> {
        self.services.get(name)
    }

    // ----- projection -----

    /// Fold the whole log into the named state.
    ///
    /// Seeds from the repository's snapshot for `name` when one exists.
    /// Returns `None` if no state is registered under `name`.
    #[tracing::instrument(skip(self), name = "engine_project")]
    pub fn project(&self, name: &str) -> Option<StateValue> {
        let snapshot = self
            .repository
            .snapshots()
            .and_then(|snapshots| snapshots.snapshot(name));
        let events = self.repository.all();
        self.projector
            .project(self, name, snapshot.as_deref(), &events)
    }

    /// Project a state and downcast it to `S`.
    ///
    /// `None` if the state is missing or has another type.
    #[must_use]
    pub fn state<S: ProjectedState>(&self, name: &str) -> Option<S> {
        self.typed_state(name).ok()
    }

    /// Project a state and downcast it to `S`, explaining failures.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] if no state is registered under `name`,
    /// or [`StateError::WrongType`] if it holds another type.
    pub fn typed_state<S: ProjectedState>(&self, name: &str) -> Result<S, StateError> {
        let value = self
            .project(name)
            .ok_or_else(|| StateError::NotFound(name.to_string()))?;
        value
            .downcast::<S>()
            .map(|state| *state)
            .map_err(|_| StateError::WrongType {
                name: name.to_string(),
                expected: std::any::type_name::<S>(),
            })
    }

    /// Names of all registered states.
    #[must_use]
    pub fn state_names(&self) -> Vec<&str> {
        self.projector.state_names()
    }

    // ----- log -----

    /// The committed events, in commit order.
    #[must_use]
    pub fn events(&self) -> Vec<EventRef> {
        self.repository.all()
    }

    /// Number of committed events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.repository.len()
    }

    /// Replace the log wholesale, bypassing validation and side effects.
    ///
    /// Used to restore persisted history.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Restore`] if the repository refuses the log.
    pub fn set_events(&mut self, events: Vec<EventRef>) -> Result<(), EngineError> {
        let count = events.len();
        self.repository.set_all(events).map_err(EngineError::Restore)?;
        tracing::debug!(count, "Event log restored");
        Ok(())
    }

    /// Encode the log as a JSON array of `{type, data}` envelopes.
    ///
    /// Events whose payload cannot be encoded are left out with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Event`] if the stream itself cannot be written.
    pub fn serialize_events(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self.registry.serialize(&self.repository.all())?)
    }

    /// Decode a persisted stream using the registered event types.
    ///
    /// Entries of unregistered types are skipped. The log is not modified;
    /// pass the result to [`set_events`](Self::set_events) to restore it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Event`] if `bytes` is not a JSON array of envelopes.
    pub fn deserialize_events(&self, bytes: &[u8]) -> Result<Vec<EventRef>, EngineError> {
        Ok(self.registry.deserialize(bytes)?)
    }

    /// Decode a persisted stream and make it the log.
    ///
    /// # Errors
    ///
    /// Fails as [`deserialize_events`](Self::deserialize_events) and
    /// [`set_events`](Self::set_events) do.
    pub fn restore_events(&mut self, bytes: &[u8]) -> Result<usize, EngineError> {
        let events = self.deserialize_events(bytes)?;
        let count = events.len();
        self.set_events(events)?;
        Ok(count)
    }

    // ----- snapshots -----

    /// Store a snapshot seeding future projections of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SnapshotsUnsupported`] if the repository cannot
    /// store snapshots, [`EngineError::SnapshotEncoding`] if `state` does not
    /// encode, or [`EngineError::Repository`] if storage fails.
    pub fn set_snapshot<S: Serialize>(&mut self, name: &str, state: &S) -> Result<(), EngineError> {
        let Some(snapshots) = self.repository.snapshots_mut() else {
            return Err(EngineError::SnapshotsUnsupported);
        };
        let bytes = serde_json::to_vec(state).map_err(|source| EngineError::SnapshotEncoding {
            state: name.to_string(),
            source,
        })?;
        snapshots.set_snapshot(name, bytes)?;
        tracing::debug!(state = name, "Snapshot stored");
        Ok(())
    }

    /// Whether a snapshot exists for `name`.
    ///
    /// Always `false` when the repository cannot store snapshots.
    #[must_use]
    pub fn has_snapshot(&self, name: &str) -> bool {
        self.repository
            .snapshots()
            .is_some_and(|snapshots| snapshots.snapshot(name).is_some())
    }

    /// Remove the snapshot for `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SnapshotsUnsupported`] if the repository cannot
    /// store snapshots, or [`EngineError::Repository`] if removal fails.
    pub fn clear_snapshot(&mut self, name: &str) -> Result<(), EngineError> {
        let snapshots = self
            .repository
            .snapshots_mut()
            .ok_or(EngineError::SnapshotsUnsupported)?;
        snapshots.clear_snapshot(name)?;
        Ok(())
    }

    // ----- environment -----

    /// Current time according to the engine clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Uniform integer in `0..upper` from the engine's random source.
    #[must_use]
    pub fn gen_below(&self, upper: usize) -> usize {
        self.random.gen_below(upper)
    }

    /// Uniform float in `[0, 1)` from the engine's random source.
    #[must_use]
    pub fn gen_unit(&self) -> f64 {
        self.random.gen_unit()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("events", &self.repository.len())
            .field("validation", &self.validation)
            .field("dispatcher", &self.dispatcher)
            .field("projector", &self.projector)
            .field("registry", &self.registry)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}
