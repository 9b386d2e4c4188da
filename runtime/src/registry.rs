//! Event type registry for (de)serializing heterogeneous event streams.
//!
//! The log holds erased events, so reading a persisted stream back needs a
//! table from type name to concrete decoder. Types are registered once at
//! startup; only registered types survive a round trip.
//!
//! Decoding is fail-soft per event. A stream written by a newer or older
//! version of the program may contain type names this process does not know,
//! or payloads whose schema changed; those entries are dropped and the rest
//! of the stream is kept. Only a document that is not a JSON array of
//! `{type, data}` envelopes fails as a whole.

use fabula_core::event::{Event, EventEnvelope, EventError, EventRef};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type DecodeFn = Box<dyn Fn(serde_json::Value) -> Result<EventRef, serde_json::Error> + Send + Sync>;

/// Map from event type name to decoder.
#[derive(Default)]
pub struct EventRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl EventRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `E` as the decoder for `event_type`, replacing any previous one.
    ///
    /// The same Rust type may be registered under several names, which is how
    /// an enum whose variants report different type names is registered.
    pub fn register<E>(&mut self, event_type: impl Into<String>)
    where
        E: Event + Serialize + DeserializeOwned,
    {
        self.decoders.insert(
            event_type.into(),
            Box::new(|data: serde_json::Value| -> Result<EventRef, serde_json::Error> {
                let event: E = serde_json::from_value(data)?;
                Ok(Arc::new(event) as EventRef)
            }),
        );
    }

    /// Whether a decoder exists for `event_type`.
    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Number of registered type names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Encode events as a JSON array of `{type, data}` envelopes.
    ///
    /// Encoding does not consult the registry; every event carries its own
    /// payload. An event whose payload cannot be represented as JSON is
    /// skipped with a warning and the rest of the stream is kept.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the envelope array itself
    /// cannot be written.
    pub fn serialize(&self, events: &[EventRef]) -> Result<Vec<u8>, EventError> {
        let envelopes: Vec<EventEnvelope> = events
            .iter()
            .filter_map(|event| match EventEnvelope::from_event(event.as_ref()) {
                Ok(envelope) => Some(envelope),
                Err(error) => {
                    tracing::warn!(%error, "Skipping unencodable event");
                    None
                }
            })
            .collect();

        serde_json::to_vec(&envelopes).map_err(|e| EventError::SerializationError {
            event_type: "stream".to_string(),
            reason: e.to_string(),
        })
    }

    /// Decode a JSON array of envelopes back into events.
    ///
    /// Unknown type names and undecodable payloads are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if `bytes` is not a JSON
    /// array of envelopes.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Vec<EventRef>, EventError> {
        let envelopes: Vec<EventEnvelope> = serde_json::from_slice(bytes)
            .map_err(|e| EventError::DeserializationError(e.to_string()))?;

        let mut events = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            match self.decode(envelope) {
                Ok(event) => events.push(event),
                Err(EventError::UnknownEventType(event_type)) => {
                    tracing::debug!(event_type = %event_type, "Skipping unregistered event type");
                }
                Err(error) => {
                    tracing::warn!(%error, "Skipping undecodable event");
                }
            }
        }

        Ok(events)
    }

    /// Decode a single envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEventType`] if no decoder is registered for
    /// the envelope's type, or [`EventError::DeserializationError`] if the
    /// payload does not decode.
    pub fn decode(&self, envelope: EventEnvelope) -> Result<EventRef, EventError> {
        let Some(decode) = self.decoders.get(&envelope.event_type) else {
            return Err(EventError::UnknownEventType(envelope.event_type));
        };
        decode(envelope.data).map_err(|e| {
            EventError::DeserializationError(format!("{}: {e}", envelope.event_type))
        })
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("EventRegistry").field("types", &names).finish()
    }
}
