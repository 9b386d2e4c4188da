//! Validation and exception pipeline.
//!
//! Every event type may have an ordered list of validators. An event is
//! accepted when each of them either approves it or is skipped by a declared
//! exception; the first validator that disapproves rejects the event and no
//! later validator runs.
//!
//! Exceptions document *why* a rule does not apply. Each one names a single
//! validator (by [`ValidatorId`]) and a condition; it suppresses only that
//! validator, only for the event type it was registered under, and only for
//! events on which the condition holds.

use crate::engine::Engine;
use fabula_core::event::{DynEvent, Event};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Decides whether an event may be committed.
///
/// Validators are pure predicates. They may read projected state through the
/// engine, which always reflects only previously committed events.
pub trait Validator: Send + Sync {
    /// Approve (`true`) or reject (`false`) the event.
    fn validate(&self, engine: &Engine, event: &dyn DynEvent) -> bool;
}

/// Identity of a registered validator, used to bind exceptions to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidatorId(u64);

impl ValidatorId {
    /// The raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validator#{}", self.0)
    }
}

/// Condition under which an exception skips its validator.
pub type SkipCondition = Arc<dyn Fn(&Engine, &dyn DynEvent) -> bool + Send + Sync>;

/// A documented, conditional bypass of one validator.
#[derive(Clone)]
pub struct ValidatorException {
    validator: ValidatorId,
    condition: SkipCondition,
    reason: String,
}

impl ValidatorException {
    /// Create an exception for `validator` that applies when `condition` holds.
    pub fn new<F>(validator: ValidatorId, condition: F, reason: impl Into<String>) -> Self
    where
        F: Fn(&Engine, &dyn DynEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            validator,
            condition: Arc::new(condition),
            reason: reason.into(),
        }
    }

    /// The validator this exception suppresses.
    #[must_use]
    pub const fn validator(&self) -> ValidatorId {
        self.validator
    }

    /// Why the exception exists.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn applies(&self, validator: ValidatorId, engine: &Engine, event: &dyn DynEvent) -> bool {
        self.validator == validator && (self.condition)(engine, event)
    }
}

impl fmt::Debug for ValidatorException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorException")
            .field("validator", &self.validator)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// Outcome of running the pipeline over one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Every validator approved or was skipped.
    Accepted,
    /// The named validator disapproved.
    Rejected {
        /// The first validator that returned `false`.
        validator: ValidatorId,
    },
}

impl Verdict {
    /// Whether the event may be committed.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

struct RegisteredValidator {
    id: ValidatorId,
    validator: Arc<dyn Validator>,
}

/// Engine-owned validator and exception tables, keyed by event type.
#[derive(Default)]
pub struct ValidationPipeline {
    validators: HashMap<String, Vec<RegisteredValidator>>,
    exceptions: HashMap<String, Vec<ValidatorException>>,
    next_id: u64,
}

impl ValidationPipeline {
    /// Create empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator for `event_type` and return its identity.
    pub fn register(&mut self, event_type: &str, validator: Arc<dyn Validator>) -> ValidatorId {
        let id = ValidatorId(self.next_id);
        self.next_id += 1;
        self.validators
            .entry(event_type.to_string())
            .or_default()
            .push(RegisteredValidator { id, validator });
        id
    }

    /// Attach an exception to the validators of `event_type`.
    pub fn register_exception(&mut self, event_type: &str, exception: ValidatorException) {
        self.exceptions
            .entry(event_type.to_string())
            .or_default()
            .push(exception);
    }

    /// Number of validators registered for `event_type`.
    #[must_use]
    pub fn validator_count(&self, event_type: &str) -> usize {
        self.validators.get(event_type).map_or(0, Vec::len)
    }

    /// Exceptions registered for `event_type`, in registration order.
    #[must_use]
    pub fn exceptions(&self, event_type: &str) -> &[ValidatorException] {
        self.exceptions.get(event_type).map_or(&[], Vec::as_slice)
    }

    /// Run the validators for the event's type.
    pub fn evaluate(&self, engine: &Engine, event: &dyn DynEvent) -> Verdict {
        let event_type = event.event_type();
        let Some(validators) = self.validators.get(event_type) else {
            return Verdict::Accepted;
        };
        let exceptions = self.exceptions(event_type);

        for registered in validators {
            if let Some(exception) = exceptions
                .iter()
                .find(|exception| exception.applies(registered.id, engine, event))
            {
                tracing::trace!(
                    event_type,
                    validator = %registered.id,
                    reason = exception.reason(),
                    "Validator skipped by exception"
                );
                continue;
            }

            if !registered.validator.validate(engine, event) {
                return Verdict::Rejected {
                    validator: registered.id,
                };
            }
        }

        Verdict::Accepted
    }
}

impl fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("event_types", &self.validators.len())
            .field("exceptions", &self.exceptions.len())
            .finish_non_exhaustive()
    }
}

/// Validator built from a closure over a concrete event type.
///
/// An event of any other concrete type fails the validator closed.
pub struct TypedValidator<E, F> {
    check: F,
    _event: PhantomData<fn(&E)>,
}

impl<E, F> Validator for TypedValidator<E, F>
where
    E: Event,
    F: Fn(&Engine, &E) -> bool + Send + Sync,
{
    fn validate(&self, engine: &Engine, event: &dyn DynEvent) -> bool {
        match event.downcast_ref::<E>() {
            Some(typed) => (self.check)(engine, typed),
            None => {
                tracing::warn!(
                    event_type = event.event_type(),
                    expected = std::any::type_name::<E>(),
                    "Typed validator received an event of another type"
                );
                false
            }
        }
    }
}

/// Build a validator from a closure over a concrete event type.
///
/// ```
/// use fabula_runtime::validation::validator_fn;
/// # use fabula_core::event::Event;
/// # #[derive(Debug, serde::Serialize)]
/// # struct OrderPlaced { amount: i64 }
/// # impl Event for OrderPlaced { fn event_type(&self) -> &'static str { "order" } }
///
/// let non_negative = validator_fn(|_engine, order: &OrderPlaced| order.amount >= 0);
/// ```
pub fn validator_fn<E, F>(check: F) -> TypedValidator<E, F>
where
    E: Event,
    F: Fn(&Engine, &E) -> bool + Send + Sync,
{
    TypedValidator {
        check,
        _event: PhantomData,
    }
}

/// Validator built from a closure over any event.
pub struct AnyValidator<F>(F);

impl<F> Validator for AnyValidator<F>
where
    F: Fn(&Engine, &dyn DynEvent) -> bool + Send + Sync,
{
    fn validate(&self, engine: &Engine, event: &dyn DynEvent) -> bool {
        (self.0)(engine, event)
    }
}

/// Build a validator from a closure that inspects the erased event.
pub const fn any_validator<F>(check: F) -> AnyValidator<F>
where
    F: Fn(&Engine, &dyn DynEvent) -> bool + Send + Sync,
{
    AnyValidator(check)
}
