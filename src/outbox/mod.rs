//! Transactional outbox.
//!
//! Events are written to the `outbox_messages` table in the same transaction
//! as the business change that produced them. The [`OutboxForwarder`] later
//! moves committed rows onto the [`EventBus`](crate::events::EventBus).
//!
//! - [`message`] - Outbox row model
//! - [`store`] - Transaction and storage contracts
//! - [`postgres`] - PostgreSQL backend
//! - [`in_memory`] - In-memory backend for tests and local runs
//! - [`forwarder`] - Background publisher

pub mod forwarder;
pub mod in_memory;
pub mod message;
pub mod postgres;
pub mod store;

pub use forwarder::{ForwarderConfig, OutboxForwarder, TickReport};
pub use in_memory::{InMemoryOutbox, InMemoryTx};
pub use message::OutboxMessage;
pub use postgres::{PgOutboxStore, PgTransactionManager, PgTx};
pub use store::{
    OutboxStats, OutboxStore, Transaction, TransactionManager, publish_in_transaction,
};
