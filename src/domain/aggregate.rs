//! Aggregate root contract used by the unit of work.

use crate::domain::event::DomainEvent;

/// An entity that records domain events as a side effect of state changes.
///
/// Events accumulate in memory until a
/// [`UnitOfWork`](crate::application::UnitOfWork) has committed the
/// transaction that persisted the change; only then are they dispatched and
/// cleared.
pub trait AggregateRoot: Send + Sync {
    type Event: DomainEvent;

    /// Pending events, oldest first.
    fn events(&self) -> &[Self::Event];

    /// Drops all pending events.
    fn clear_events(&mut self);
}

/// Ordered buffer of pending events, embedded by aggregates.
#[derive(Debug, Clone)]
pub struct EventBuffer<E> {
    pending: Vec<E>,
}

impl<E> EventBuffer<E> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn record(&mut self, event: E) {
        self.pending.push(event);
    }

    pub fn as_slice(&self) -> &[E] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<E> Default for EventBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}
