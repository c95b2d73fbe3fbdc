//! Synchronous, in-process event dispatch.
//!
//! Used for same-process reactions that do not need durability (inline
//! projections, counters, logging). Cross-process delivery goes through the
//! outbox and the [`Router`](crate::events::Router).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::event::DomainEvent;
use crate::error::EventError;

/// A same-process reaction to a domain event.
#[async_trait]
pub trait EventHandler<E: DomainEvent>: Send + Sync {
    async fn handle(&self, event: &E) -> Result<(), EventError>;
}

/// Routes events to handlers registered under their exact name.
///
/// Handlers run in registration order. The first failing handler stops the
/// dispatch of that event and its error is returned.
pub struct Dispatcher<E: DomainEvent> {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler<E>>>>,
}

impl<E: DomainEvent> Dispatcher<E> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, event_name: impl Into<String>, handler: Arc<dyn EventHandler<E>>) {
        self.handlers
            .entry(event_name.into())
            .or_default()
            .push(handler);
    }

    /// Number of handlers registered for `event_name`.
    pub fn handler_count(&self, event_name: &str) -> usize {
        self.handlers.get(event_name).map_or(0, Vec::len)
    }

    /// Dispatches one event. No registered handler is not an error.
    pub async fn dispatch(&self, event: &E) -> Result<(), EventError> {
        let Some(handlers) = self.handlers.get(event.event_name()) else {
            return Ok(());
        };

        for handler in handlers {
            handler.handle(event).await?;
        }

        Ok(())
    }

    /// Dispatches events in order, stopping at the first error.
    pub async fn dispatch_all(&self, events: &[E]) -> Result<(), EventError> {
        for event in events {
            self.dispatch(event).await?;
        }
        Ok(())
    }
}

impl<E: DomainEvent> Default for Dispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}
