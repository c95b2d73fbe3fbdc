//! PostgreSQL implementation of the outbox.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres};
use uuid::Uuid;

use super::message::OutboxMessage;
use super::store::{OutboxStats, OutboxStore, Transaction, TransactionManager};
use crate::error::EventError;

/// An open PostgreSQL transaction.
///
/// Repositories write through [`PgTx::conn`] so that their statements run in
/// the same transaction as the outbox insert.
pub struct PgTx {
    inner: sqlx::Transaction<'static, Postgres>,
}

impl PgTx {
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.inner
    }
}

#[async_trait]
impl Transaction for PgTx {
    async fn insert_outbox(&mut self, message: &OutboxMessage) -> Result<(), EventError> {
        let result = sqlx::query(
            r#"
            INSERT INTO outbox_messages (uuid, payload, metadata, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(message.uuid)
        .bind(&message.payload)
        .bind(Json(&message.metadata))
        .bind(message.created_at)
        .execute(&mut *self.inner)
        .await;

        match result.map_err(EventError::from) {
            Ok(_) => Ok(()),
            Err(e) if e.is_unique_violation() => Err(EventError::DuplicateMessage(message.uuid)),
            Err(e) => Err(e),
        }
    }

    async fn commit(self) -> Result<(), EventError> {
        self.inner.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), EventError> {
        self.inner.rollback().await?;
        Ok(())
    }
}

/// Opens [`PgTx`] transactions from a connection pool.
#[derive(Clone)]
pub struct PgTransactionManager {
    pool: Arc<PgPool>,
}

impl PgTransactionManager {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, EventError> {
        let inner = self.pool.begin().await?;
        Ok(PgTx { inner })
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    uuid: Uuid,
    payload: Vec<u8>,
    metadata: Option<Json<HashMap<String, String>>>,
    created_at: DateTime<Utc>,
}

impl From<OutboxRow> for OutboxMessage {
    fn from(row: OutboxRow) -> Self {
        Self {
            uuid: row.uuid,
            payload: row.payload,
            metadata: row.metadata.map(|Json(m)| m).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL read/delete side of the `outbox_messages` table.
pub struct PgOutboxStore {
    pool: Arc<PgPool>,
}

impl PgOutboxStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxMessage>, EventError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT uuid, payload, metadata, created_at
            FROM outbox_messages
            ORDER BY created_at ASC, uuid ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(OutboxMessage::from).collect())
    }

    async fn delete(&self, uuid: Uuid) -> Result<(), EventError> {
        sqlx::query("DELETE FROM outbox_messages WHERE uuid = $1")
            .bind(uuid)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats, EventError> {
        let (pending, oldest_created_at): (i64, Option<DateTime<Utc>>) =
            sqlx::query_as("SELECT COUNT(*), MIN(created_at) FROM outbox_messages")
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(OutboxStats {
            pending: pending.max(0) as u64,
            oldest_created_at,
        })
    }
}
