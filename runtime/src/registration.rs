//! Fluent registration of all rules for one event type.
//!
//! ```
//! use fabula_core::event::Event;
//! use fabula_runtime::Engine;
//! use fabula_runtime::dispatch::listener_fn;
//! use fabula_runtime::validation::validator_fn;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Default, Serialize, Deserialize)]
//! struct Revenue { total: f64 }
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct OrderPlaced { amount: f64 }
//!
//! impl Event for OrderPlaced {
//!     fn event_type(&self) -> &'static str { "order_placed" }
//! }
//!
//! let mut engine = Engine::new();
//! engine.register_state("revenue", Revenue::default());
//! engine
//!     .when("order_placed")
//!     .requires(validator_fn(|_, order: &OrderPlaced| order.amount > 0.0))
//!     .except_when(|_, order: &OrderPlaced| order.amount == 0.0, "Free orders skip the amount check")
//!     .updates("revenue", |_, mut revenue: Revenue, order: &OrderPlaced| {
//!         revenue.total += order.amount;
//!         revenue
//!     })
//!     .decodes::<OrderPlaced>();
//!
//! assert!(engine.submit(OrderPlaced { amount: 0.0 }));
//! assert!(!engine.submit(OrderPlaced { amount: -1.0 }));
//! ```

use crate::dispatch::Listener;
use crate::engine::Engine;
use crate::projection::ProjectedState;
use crate::validation::{Validator, ValidatorException, ValidatorId};
use fabula_core::event::{DynEvent, Event};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Registration scope for one event type, returned by [`Engine::when`].
#[must_use = "registration methods return the builder for chaining"]
pub struct EventRegistration<'a> {
    engine: &'a mut Engine,
    event_type: String,
    last_validator: Option<ValidatorId>,
}

impl<'a> EventRegistration<'a> {
    pub(crate) fn new(engine: &'a mut Engine, event_type: String) -> Self {
        Self {
            engine,
            event_type,
            last_validator: None,
        }
    }

    /// The event type being configured.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Id of the validator most recently added through this builder.
    #[must_use]
    pub const fn validator_id(&self) -> Option<ValidatorId> {
        self.last_validator
    }

    /// Append a validator.
    pub fn requires(mut self, validator: impl Validator + 'static) -> Self {
        let id = self.engine.register_validator(&self.event_type, validator);
        self.last_validator = Some(id);
        self
    }

    /// Skip the most recently added validator when `condition` holds.
    ///
    /// Without a preceding [`requires`](Self::requires) there is nothing to
    /// bind to; the exception is dropped with a warning.
    pub fn except<F>(self, condition: F, reason: impl Into<String>) -> Self
    where
        F: Fn(&Engine, &dyn DynEvent) -> bool + Send + Sync + 'static,
    {
        let Some(validator) = self.last_validator else {
            let reason = reason.into();
            tracing::warn!(
                event_type = %self.event_type,
                reason = %reason,
                "Exception declared before any validator; ignored"
            );
            return self;
        };
        self.except_for(validator, condition, reason)
    }

    /// [`except`](Self::except) with a condition over the concrete event type.
    ///
    /// Events of another type never match.
    pub fn except_when<E, F>(self, condition: F, reason: impl Into<String>) -> Self
    where
        E: Event,
        F: Fn(&Engine, &E) -> bool + Send + Sync + 'static,
    {
        self.except(
            move |engine, event| event.downcast_ref::<E>().is_some_and(|typed| condition(engine, typed)),
            reason,
        )
    }

    /// Skip a specific validator when `condition` holds.
    pub fn except_for<F>(self, validator: ValidatorId, condition: F, reason: impl Into<String>) -> Self
    where
        F: Fn(&Engine, &dyn DynEvent) -> bool + Send + Sync + 'static,
    {
        self.engine.register_exception(
            &self.event_type,
            ValidatorException::new(validator, condition, reason),
        );
        self
    }

    /// Append a before-hook.
    pub fn before(self, hook: impl Listener + 'static) -> Self {
        self.engine.register_hook(&self.event_type, hook);
        self
    }

    /// Append a post-commit listener.
    pub fn then(self, listener: impl Listener + 'static) -> Self {
        self.engine.register_listener(&self.event_type, listener);
        self
    }

    /// Attach the reducer for `state`.
    pub fn updates<S, E, F>(self, state: &str, reduce: F) -> Self
    where
        S: ProjectedState,
        E: Event,
        F: Fn(&Engine, S, &E) -> S + Send + Sync + 'static,
    {
        self.engine.register_reducer(state, &self.event_type, reduce);
        self
    }

    /// Attach an ordered reducer for `state` at `priority`.
    pub fn updates_ordered<S, E, F>(self, state: &str, priority: i32, reduce: F) -> Self
    where
        S: ProjectedState,
        E: Event,
        F: Fn(&Engine, S, &E) -> S + Send + Sync + 'static,
    {
        self.engine
            .register_ordered_reducer(&self.event_type, state, priority, reduce);
        self
    }

    /// Register `E` as the decoder for this event type.
    pub fn decodes<E>(self) -> Self
    where
        E: Event + Serialize + DeserializeOwned,
    {
        self.engine.register_event_type::<E>(self.event_type.clone());
        self
    }
}
