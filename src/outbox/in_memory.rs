//! In-memory transactional outbox for tests and local development.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::message::OutboxMessage;
use super::store::{OutboxStats, OutboxStore, Transaction, TransactionManager};
use crate::error::EventError;

/// Outbox table kept in process memory.
///
/// Rows inserted through an [`InMemoryTx`] become visible only when the
/// transaction commits. Cloning yields another handle to the same table.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    rows: Arc<Mutex<Vec<OutboxMessage>>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows in forwarding order.
    pub fn rows(&self) -> Vec<OutboxMessage> {
        let mut rows = self.lock().clone();
        rows.sort_by_key(OutboxMessage::sort_key);
        rows
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.lock().iter().any(|row| row.uuid == uuid)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OutboxMessage>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A transaction over an [`InMemoryOutbox`].
///
/// Dropping it without committing discards the staged rows, like a database
/// rollback.
pub struct InMemoryTx {
    rows: Arc<Mutex<Vec<OutboxMessage>>>,
    staged: Vec<OutboxMessage>,
}

impl InMemoryTx {
    /// Rows staged so far in this transaction.
    pub fn staged(&self) -> &[OutboxMessage] {
        &self.staged
    }
}

#[async_trait]
impl Transaction for InMemoryTx {
    async fn insert_outbox(&mut self, message: &OutboxMessage) -> Result<(), EventError> {
        let committed = self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|row| row.uuid == message.uuid);

        if committed || self.staged.iter().any(|row| row.uuid == message.uuid) {
            return Err(EventError::DuplicateMessage(message.uuid));
        }

        self.staged.push(message.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), EventError> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(dup) = self
            .staged
            .iter()
            .find(|staged| rows.iter().any(|row| row.uuid == staged.uuid))
        {
            return Err(EventError::DuplicateMessage(dup.uuid));
        }

        rows.extend(self.staged);
        Ok(())
    }

    async fn rollback(self) -> Result<(), EventError> {
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for InMemoryOutbox {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, EventError> {
        Ok(InMemoryTx {
            rows: self.rows.clone(),
            staged: Vec::new(),
        })
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxMessage>, EventError> {
        let mut rows = self.rows();
        rows.truncate(limit);
        Ok(rows)
    }

    async fn delete(&self, uuid: Uuid) -> Result<(), EventError> {
        self.lock().retain(|row| row.uuid != uuid);
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats, EventError> {
        let rows = self.lock();
        Ok(OutboxStats {
            pending: rows.len() as u64,
            oldest_created_at: rows.iter().map(|row| row.created_at).min(),
        })
    }
}
