//! Event trait and related types for event sourcing.
//!
//! Events represent facts about things that have happened and are immutable.
//! The engine stores them type-erased as [`EventRef`] so that one log can hold
//! a heterogeneous stream, while reducers, validators and listeners downcast
//! back to the concrete type they care about.
//!
//! # Design
//!
//! Every event carries a stable type name (`event_type()`), which is the only
//! key used for routing: validators, hooks, listeners, reducers and the
//! serialization registry are all looked up by it.
//!
//! Persisted streams use JSON. Each event is wrapped in an [`EventEnvelope`]
//! (`{"type": ..., "data": ...}`) and a stream is a JSON array of envelopes.
//!
//! # Example
//!
//! ```
//! use fabula_core::event::{Event, EventRef, IntoEventRef};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct OrderPlaced {
//!     order_id: String,
//!     amount: f64,
//! }
//!
//! impl Event for OrderPlaced {
//!     fn event_type(&self) -> &'static str {
//!         "order_placed"
//!     }
//! }
//!
//! let event: EventRef = OrderPlaced { order_id: "o-1".into(), amount: 9.5 }.into_event_ref();
//! assert_eq!(event.event_type(), "order_placed");
//! assert!(event.downcast_ref::<OrderPlaced>().is_some());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to encode an event payload.
    #[error("Failed to serialize event {event_type}: {reason}")]
    SerializationError {
        /// Type name of the event that could not be encoded.
        event_type: String,
        /// Underlying encoder message.
        reason: String,
    },

    /// The outer document of a persisted stream could not be decoded.
    #[error("Failed to deserialize event stream: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// An immutable fact that can be committed to the event log.
///
/// The type name returned by [`Event::event_type`] must be stable across
/// versions of the program: it is stored next to the payload in persisted
/// streams and used to pick a decoder when a stream is read back.
///
/// Events must be `Send + Sync + 'static` so the log can share them between
/// the engine, its repository and any embedding system.
pub trait Event: Send + Sync + fmt::Debug + 'static {
    /// Returns the logical type name of this event (e.g. `"order_placed"`).
    fn event_type(&self) -> &'static str;
}

/// Type-erased view of an event, as stored in the log.
///
/// Implemented automatically for every `Event + Serialize` type, so
/// application code never implements it by hand.
pub trait DynEvent: Event {
    /// Encode the event's own fields as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload contains
    /// something JSON cannot represent (for example a map with non-string keys).
    fn payload(&self) -> Result<serde_json::Value, EventError>;

    /// Access the concrete event for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<E> DynEvent for E
where
    E: Event + Serialize,
{
    fn payload(&self) -> Result<serde_json::Value, EventError> {
        serde_json::to_value(self).map_err(|e| EventError::SerializationError {
            event_type: self.event_type().to_string(),
            reason: e.to_string(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<'a> dyn DynEvent + 'a {
    /// Downcast to a concrete event type.
    ///
    /// Returns `None` if the event is of another type.
    #[must_use]
    pub fn downcast_ref<E: Any>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Check whether the event is of the given concrete type.
    #[must_use]
    pub fn is<E: Any>(&self) -> bool {
        self.as_any().is::<E>()
    }
}

/// Shared handle to an event in the log.
pub type EventRef = Arc<dyn DynEvent>;

/// Conversion into a shared log entry.
///
/// Implemented for every concrete `Event + Serialize` type and for
/// [`EventRef`] itself, so APIs can accept either.
pub trait IntoEventRef {
    /// Wrap `self` as an [`EventRef`].
    fn into_event_ref(self) -> EventRef;
}

impl<E> IntoEventRef for E
where
    E: Event + Serialize,
{
    fn into_event_ref(self) -> EventRef {
        Arc::new(self)
    }
}

impl IntoEventRef for EventRef {
    fn into_event_ref(self) -> EventRef {
        self
    }
}

/// Events that carry their own occurrence time.
///
/// The engine stamps such events with its clock when they are submitted via
/// `submit_stamped`.
pub trait Timestamped {
    /// Set the time at which the event occurred.
    fn stamp(&mut self, at: DateTime<Utc>);
}

/// Wire form of one event in a persisted stream.
///
/// ```
/// use fabula_core::event::EventEnvelope;
///
/// let envelope = EventEnvelope::new("add", serde_json::json!({ "value": 3 }));
/// let json = serde_json::to_string(&envelope).unwrap();
/// assert_eq!(json, r#"{"type":"add","data":{"value":3}}"#);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The event type name.
    #[serde(rename = "type")]
    pub event_type: String,

    /// The event payload, as produced by [`DynEvent::payload`].
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Wrap a log entry.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be encoded.
    pub fn from_event(event: &dyn DynEvent) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.payload()?,
        })
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventEnvelope {{ type: {} }}", self.event_type)
    }
}
