//! Side-effect dispatch around the commit of an event.
//!
//! Two kinds of side effects exist, both expressed as a [`Listener`]:
//!
//! - **before-hooks** run after validation and before the repository commit.
//!   Events they submit complete their own pipeline first, so they land in
//!   the log *before* the event that triggered them.
//! - **listeners** run after the commit. Events they submit land *after* the
//!   triggering event, in the listener's relative position.
//!
//! Both receive `&mut Engine` and may submit further events; nesting is a
//! plain recursive call on the same thread. Nothing detects emission cycles:
//! a listener that re-triggers itself forever is a programming error.
//!
//! On top of the raw trait this module provides typed closures
//! ([`listener_fn`]), conditional listeners ([`when_valid`]) and an emit
//! builder ([`emit`]) for fan-out of new events.

use crate::engine::Engine;
use crate::validation::Validator;
use fabula_core::event::{DynEvent, Event, IntoEventRef};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A side effect run for an event, before or after its commit.
pub trait Listener: Send + Sync {
    /// React to the event.
    fn handle(&self, engine: &mut Engine, event: &dyn DynEvent);
}

/// Engine-owned hook and listener tables, keyed by event type.
#[derive(Default)]
pub struct Dispatcher {
    hooks: HashMap<String, Vec<Arc<dyn Listener>>>,
    listeners: HashMap<String, Vec<Arc<dyn Listener>>>,
}

impl Dispatcher {
    /// Create empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a before-hook for `event_type`.
    pub fn register_hook(&mut self, event_type: &str, hook: Arc<dyn Listener>) {
        self.hooks.entry(event_type.to_string()).or_default().push(hook);
    }

    /// Append a post-commit listener for `event_type`.
    pub fn register_listener(&mut self, event_type: &str, listener: Arc<dyn Listener>) {
        self.listeners
            .entry(event_type.to_string())
            .or_default()
            .push(listener);
    }

    /// Before-hooks for `event_type`, in registration order.
    ///
    /// Returned as owned handles so they can run against `&mut Engine`.
    #[must_use]
    pub fn hooks_for(&self, event_type: &str) -> Vec<Arc<dyn Listener>> {
        self.hooks.get(event_type).cloned().unwrap_or_default()
    }

    /// Listeners for `event_type`, in registration order.
    #[must_use]
    pub fn listeners_for(&self, event_type: &str) -> Vec<Arc<dyn Listener>> {
        self.listeners.get(event_type).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("hooked_types", &self.hooks.len())
            .field("listened_types", &self.listeners.len())
            .finish()
    }
}

/// Listener built from a closure over a concrete event type.
///
/// Events of any other concrete type are ignored.
pub struct TypedListener<E, F> {
    action: F,
    _event: PhantomData<fn(&E)>,
}

impl<E, F> Listener for TypedListener<E, F>
where
    E: Event,
    F: Fn(&mut Engine, &E) + Send + Sync,
{
    fn handle(&self, engine: &mut Engine, event: &dyn DynEvent) {
        match event.downcast_ref::<E>() {
            Some(typed) => (self.action)(engine, typed),
            None => tracing::warn!(
                event_type = event.event_type(),
                expected = std::any::type_name::<E>(),
                "Typed listener received an event of another type"
            ),
        }
    }
}

/// Build a listener from a closure over a concrete event type.
pub fn listener_fn<E, F>(action: F) -> TypedListener<E, F>
where
    E: Event,
    F: Fn(&mut Engine, &E) + Send + Sync,
{
    TypedListener {
        action,
        _event: PhantomData,
    }
}

/// Listener built from a closure over any event.
pub struct AnyListener<F>(F);

impl<F> Listener for AnyListener<F>
where
    F: Fn(&mut Engine, &dyn DynEvent) + Send + Sync,
{
    fn handle(&self, engine: &mut Engine, event: &dyn DynEvent) {
        (self.0)(engine, event);
    }
}

/// Build a listener from a closure that inspects the erased event.
pub const fn any_listener<F>(action: F) -> AnyListener<F>
where
    F: Fn(&mut Engine, &dyn DynEvent) + Send + Sync,
{
    AnyListener(action)
}

/// Runs an action only when a condition approves the event.
///
/// Keeps rule conditions visible at registration time instead of burying
/// them inside listener bodies:
///
/// ```ignore
/// engine.register_listener("player_joined", when_valid(IsCreator).then(GrantStartingCards));
/// ```
pub struct ConditionalListener {
    condition: Arc<dyn Validator>,
    action: Arc<dyn Listener>,
}

impl Listener for ConditionalListener {
    fn handle(&self, engine: &mut Engine, event: &dyn DynEvent) {
        if !self.condition.validate(engine, event) {
            tracing::trace!(
                event_type = event.event_type(),
                "Conditional listener skipped"
            );
            return;
        }
        self.action.handle(engine, event);
    }
}

/// First half of a [`ConditionalListener`].
pub struct ConditionalBuilder {
    condition: Arc<dyn Validator>,
}

impl ConditionalBuilder {
    /// Complete the conditional listener with the action to run.
    #[must_use]
    pub fn then(self, action: impl Listener + 'static) -> ConditionalListener {
        ConditionalListener {
            condition: self.condition,
            action: Arc::new(action),
        }
    }
}

/// Start a conditional listener guarded by `condition`.
pub fn when_valid(condition: impl Validator + 'static) -> ConditionalBuilder {
    ConditionalBuilder {
        condition: Arc::new(condition),
    }
}

type EmitCondition<In> = Box<dyn Fn(&In) -> bool + Send + Sync>;

/// Builder for a listener that derives new events from the one it receives.
pub struct EmitBuilder<In, Out> {
    label: &'static str,
    condition: Option<EmitCondition<In>>,
    _out: PhantomData<fn() -> Out>,
}

impl<In, Out> EmitBuilder<In, Out>
where
    In: Event,
    Out: IntoEventRef + 'static,
{
    /// Emit only when `condition` holds for the incoming event.
    #[must_use]
    pub fn only_if<C>(mut self, condition: C) -> Self
    where
        C: Fn(&In) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Box::new(condition));
        self
    }

    /// Finish the builder with the transformation producing new events.
    ///
    /// Returning several events fans out; each one goes through the full
    /// pipeline, in order.
    pub fn from<T>(self, transform: T) -> EmitListener<In, Out>
    where
        T: Fn(&In) -> Vec<Out> + Send + Sync + 'static,
    {
        EmitListener {
            label: self.label,
            condition: self.condition,
            transform: Box::new(transform),
        }
    }
}

/// Start an emit builder. `label` names the produced events in logs.
///
/// ```ignore
/// engine.register_listener(
///     "player_registered",
///     emit::<PlayerRegistered, TokensGranted>("tokens_granted")
///         .only_if(|player| player.kind == PlayerKind::Creator)
///         .from(|player| vec![TokensGranted { player: player.name.clone(), amount: 100 }]),
/// );
/// ```
#[must_use]
pub fn emit<In, Out>(label: &'static str) -> EmitBuilder<In, Out>
where
    In: Event,
    Out: IntoEventRef + 'static,
{
    EmitBuilder {
        label,
        condition: None,
        _out: PhantomData,
    }
}

type EmitTransform<In, Out> = Box<dyn Fn(&In) -> Vec<Out> + Send + Sync>;

/// Listener produced by [`EmitBuilder::from`].
pub struct EmitListener<In, Out> {
    label: &'static str,
    condition: Option<EmitCondition<In>>,
    transform: EmitTransform<In, Out>,
}

impl<In, Out> Listener for EmitListener<In, Out>
where
    In: Event,
    Out: IntoEventRef + 'static,
{
    fn handle(&self, engine: &mut Engine, event: &dyn DynEvent) {
        let Some(incoming) = event.downcast_ref::<In>() else {
            return;
        };
        if self.condition.as_ref().is_some_and(|condition| !condition(incoming)) {
            return;
        }

        for produced in (self.transform)(incoming) {
            if !engine.submit(produced) {
                tracing::debug!(label = self.label, "Emitted event was rejected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validator_fn;
    use serde::Serialize;
    use std::sync::Mutex;

    #[derive(Debug, Serialize)]
    struct PlayerRegistered {
        name: String,
        creator: bool,
    }

    impl Event for PlayerRegistered {
        fn event_type(&self) -> &'static str {
            "player_registered"
        }
    }

    #[derive(Debug, Serialize)]
    struct TokensGranted {
        name: String,
        amount: u32,
    }

    impl Event for TokensGranted {
        fn event_type(&self) -> &'static str {
            "tokens_granted"
        }
    }

    fn alice() -> PlayerRegistered {
        PlayerRegistered {
            name: "Alice".to_string(),
            creator: true,
        }
    }

    fn bob() -> PlayerRegistered {
        PlayerRegistered {
            name: "Bob".to_string(),
            creator: false,
        }
    }

    #[test]
    fn tables_keep_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            dispatcher.register_listener(
                "player_registered",
                Arc::new(any_listener(move |_, _| {
                    if let Ok(mut seen) = seen.lock() {
                        seen.push(tag);
                    }
                })),
            );
        }

        let mut engine = Engine::new();
        for listener in dispatcher.listeners_for("player_registered") {
            listener.handle(&mut engine, &alice());
        }

        assert_eq!(*seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner), vec![
            "first", "second"
        ]);
        assert!(dispatcher.hooks_for("player_registered").is_empty());
    }

    #[test]
    fn conditional_listener_runs_only_when_condition_holds() {
        let mut engine = Engine::new();
        engine.register_listener(
            "player_registered",
            when_valid(validator_fn(|_, player: &PlayerRegistered| player.creator)).then(
                listener_fn(|engine: &mut Engine, player: &PlayerRegistered| {
                    engine.submit(TokensGranted {
                        name: player.name.clone(),
                        amount: 3,
                    });
                }),
            ),
        );

        engine.submit(alice());
        engine.submit(bob());

        let types: Vec<_> = engine.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec![
            "player_registered",
            "tokens_granted",
            "player_registered"
        ]);
    }

    #[test]
    fn emit_builder_respects_condition() {
        let mut engine = Engine::new();
        engine.register_listener(
            "player_registered",
            emit::<PlayerRegistered, TokensGranted>("tokens_granted")
                .only_if(|player| player.creator)
                .from(|player| {
                    vec![TokensGranted {
                        name: player.name.clone(),
                        amount: 100,
                    }]
                }),
        );

        engine.submit(alice());
        engine.submit(bob());

        let events = engine.events();
        assert_eq!(events.len(), 3);
        let granted = events[1].downcast_ref::<TokensGranted>();
        assert_eq!(granted.map(|g| (g.name.as_str(), g.amount)), Some(("Alice", 100)));
        assert_eq!(events[2].event_type(), "player_registered");
    }

    #[test]
    fn emit_builder_fans_out_mixed_events() {
        #[derive(Debug, Serialize)]
        struct WelcomeEmail {
            name: String,
        }

        impl Event for WelcomeEmail {
            fn event_type(&self) -> &'static str {
                "welcome_email"
            }
        }

        let mut engine = Engine::new();
        engine.register_listener(
            "player_registered",
            emit::<PlayerRegistered, fabula_core::EventRef>("tokens_and_welcome").from(|player| {
                vec![
                    TokensGranted {
                        name: player.name.clone(),
                        amount: 25,
                    }
                    .into_event_ref(),
                    WelcomeEmail {
                        name: player.name.clone(),
                    }
                    .into_event_ref(),
                ]
            }),
        );

        engine.submit(bob());

        let types: Vec<_> = engine.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec![
            "player_registered",
            "tokens_granted",
            "welcome_email"
        ]);
    }
}
