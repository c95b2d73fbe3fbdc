//! Event bus abstraction: topic-based publish/subscribe over opaque messages.
//!
//! The bus is a volatile transport. Durability is the outbox's job, so an
//! implementation may drop undelivered messages when it closes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BusError;

/// Topic carrying every link domain event.
pub const DEFAULT_TOPIC: &str = "link-events";

/// A transport message: id, opaque payload and string metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub uuid: String,
    pub payload: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

impl Message {
    pub fn new(uuid: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            uuid: uuid.into(),
            payload,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Delivery outcome counters shared by every subscription of a bus.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    acked: AtomicU64,
    nacked: AtomicU64,
}

impl DeliveryStats {
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    pub fn nacked(&self) -> u64 {
        self.nacked.load(Ordering::Relaxed)
    }
}

/// A message handed to one subscriber, to be settled with [`ack`](Self::ack)
/// or [`nack`](Self::nack).
#[derive(Debug)]
pub struct Delivery {
    message: Message,
    stats: Arc<DeliveryStats>,
}

impl Delivery {
    pub fn new(message: Message, stats: Arc<DeliveryStats>) -> Self {
        Self { message, stats }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Marks the message as handled.
    pub fn ack(self) {
        self.stats.acked.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks the message as unhandled.
    ///
    /// Transports without persistent redelivery only record and log the
    /// outcome; the outbox keeps no copy once the message was published.
    pub fn nack(self) {
        self.stats.nacked.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            message_uuid = %self.message.uuid,
            "Message nacked; transport has no redelivery, dropping"
        );
    }
}

/// Stream of deliveries for one subscriber.
///
/// Ends when the bus closes; messages still buffered at that point are dropped.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Delivery>,
    closed: Arc<AtomicBool>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Delivery>, closed: Arc<AtomicBool>) -> Self {
        Self { rx, closed }
    }

    /// Waits for the next delivery, or `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Delivery> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let delivery = self.rx.recv().await?;
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        Some(delivery)
    }
}

/// Broker abstraction for domain event transport.
///
/// # Implementations
///
/// - [`crate::events::InMemoryBus`] - Process-local broadcast bus
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a message to every current subscriber of `topic`.
    ///
    /// Must not wait for subscribers to process the message.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`close`](Self::close), or
    /// [`BusError::Publish`] if the transport rejects the message.
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BusError>;

    /// Opens a new independent subscription; each subscriber receives its own
    /// copy of every message published after this call.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`close`](Self::close).
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;

    /// Terminates all subscriptions.
    async fn close(&self) -> Result<(), BusError>;
}
