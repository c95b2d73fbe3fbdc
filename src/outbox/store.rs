//! Transaction and outbox storage contracts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::message::OutboxMessage;
use crate::domain::event::DomainEvent;
use crate::error::EventError;

/// An open database transaction that can stage outbox rows.
///
/// Business repositories take `&mut Tx` so that their writes and the outbox
/// insert share one commit.
#[async_trait]
pub trait Transaction: Send + 'static {
    /// Inserts an outbox row inside this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DuplicateMessage`] or a database error when the
    /// row's uuid already exists.
    async fn insert_outbox(&mut self, message: &OutboxMessage) -> Result<(), EventError>;

    async fn commit(self) -> Result<(), EventError>;

    async fn rollback(self) -> Result<(), EventError>;
}

/// Opens transactions against a backing store.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx, EventError>;
}

/// Snapshot of the outbox backlog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboxStats {
    pub pending: u64,
    pub oldest_created_at: Option<DateTime<Utc>>,
}

/// Read/delete side of the outbox, used by the forwarder.
///
/// # Implementations
///
/// - [`crate::outbox::PgOutboxStore`] - PostgreSQL implementation
/// - [`crate::outbox::InMemoryOutbox`] - In-memory implementation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `limit` committed rows, oldest `created_at` first.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxMessage>, EventError>;

    /// Deletes one row by primary key. Deleting a missing row is not an error.
    async fn delete(&self, uuid: Uuid) -> Result<(), EventError>;

    async fn stats(&self) -> Result<OutboxStats, EventError>;
}

/// Serializes `events` and inserts one outbox row per event through `tx`.
///
/// Purely a local write: nothing leaves the process until the forwarder
/// picks the committed rows up.
///
/// # Errors
///
/// Returns a serialization error or the transaction's insert error. The
/// caller must roll the transaction back.
pub async fn publish_in_transaction<T, E>(tx: &mut T, events: &[E]) -> Result<(), EventError>
where
    T: Transaction,
    E: DomainEvent,
{
    for event in events {
        let message = OutboxMessage::from_event(event)?;
        tx.insert_outbox(&message).await?;

        tracing::debug!(
            event_id = %message.uuid,
            event_name = event.event_name(),
            aggregate_id = event.aggregate_id(),
            "Event staged in outbox"
        );
    }
    Ok(())
}
