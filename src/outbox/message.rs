//! Outbox row model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::event::DomainEvent;
use crate::events::{Envelope, Message};

/// A durable record of one domain event awaiting publication.
///
/// `uuid` mirrors the event id; `payload` holds the serialized [`Envelope`];
/// `created_at` is the event's occurrence time, which fixes the forwarding
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    pub uuid: Uuid,
    pub payload: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    /// Serializes a domain event into an outbox row.
    ///
    /// # Errors
    ///
    /// Returns an error if the event payload cannot be serialized.
    pub fn from_event<E: DomainEvent + ?Sized>(event: &E) -> Result<Self, serde_json::Error> {
        let envelope = Envelope::from_event(event)?;

        Ok(Self {
            uuid: envelope.event_id,
            payload: envelope.to_bytes()?,
            metadata: envelope.metadata(),
            created_at: envelope.occurred_at,
        })
    }

    /// Rebuilds the transport message published by the forwarder.
    pub fn to_message(&self) -> Message {
        Message::new(self.uuid.to_string(), self.payload.clone()).with_metadata(self.metadata.clone())
    }

    /// Forwarding order: oldest first, event id breaks ties.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.uuid)
    }
}
