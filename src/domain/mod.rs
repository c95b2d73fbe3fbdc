//! Domain layer: events, aggregates and pure business helpers.
//!
//! # Architecture
//!
//! - [`event`] - The [`DomainEvent`](event::DomainEvent) contract
//! - [`aggregate`] - The [`AggregateRoot`](aggregate::AggregateRoot) contract
//! - [`link_events`] - The closed set of link events
//! - [`entities`] - The [`Link`](entities::Link) aggregate
//! - [`enrichment`] - Pure click classification used by analytics consumers
//! - [`repositories`] - Transactional persistence contracts
//!
//! Aggregates and events know nothing about the outbox, the bus or the
//! database; they only record events, and the unit of work decides when they
//! leave. Repository contracts are generic over the outbox
//! [`Transaction`](crate::outbox::Transaction) so that their writes commit
//! together with the staged events.

pub mod aggregate;
pub mod enrichment;
pub mod entities;
pub mod event;
pub mod link_events;
pub mod repositories;
