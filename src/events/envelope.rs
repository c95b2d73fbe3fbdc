//! Wire envelope: the serialized, transport-ready form of a domain event.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::event::DomainEvent;
use crate::domain::link_events::{EventMeta, LinkEvent};

/// Metadata key mirroring the envelope's event name.
pub const META_EVENT_NAME: &str = "event_name";
/// Metadata key mirroring the envelope's aggregate id.
pub const META_AGGREGATE_ID: &str = "aggregate_id";

/// JSON envelope stored in the outbox and published on the bus.
///
/// ```json
/// {
///   "event_id": "0190c6b0-...",
///   "event_name": "link.created",
///   "aggregate_id": "abc123",
///   "occurred_at": "2024-07-01T12:00:00Z",
///   "payload": { "code": "abc123", "long_url": "https://example.com" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: Uuid,
    pub event_name: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wraps a domain event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event payload cannot be serialized.
    pub fn from_event<E: DomainEvent + ?Sized>(event: &E) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: event.event_id(),
            event_name: event.event_name().to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            occurred_at: event.occurred_at(),
            payload: event.payload()?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Transport metadata used for filtering without decoding the payload.
    pub fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            (META_EVENT_NAME.to_string(), self.event_name.clone()),
            (META_AGGREGATE_ID.to_string(), self.aggregate_id.clone()),
        ])
    }

    /// Decodes the event-specific payload into a concrete type.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// Rebuilds a typed link event; `Ok(None)` for unknown event names.
    pub fn to_link_event(&self) -> Result<Option<LinkEvent>, serde_json::Error> {
        let meta = EventMeta {
            event_id: self.event_id,
            link_code: self.aggregate_id.clone(),
            occurred_at: self.occurred_at,
        };
        LinkEvent::from_parts(meta, &self.event_name, self.payload.clone())
    }
}
