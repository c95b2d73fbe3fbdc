//! Error types for event staging, forwarding and delivery.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the event bus transport.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus is closed")]
    Closed,

    #[error("failed to publish message {uuid}: {reason}")]
    Publish { uuid: String, reason: String },
}

/// Errors produced by the outbox, unit of work, dispatcher and router.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("handler `{handler}` failed: {message}")]
    Handler { handler: String, message: String },

    #[error("outbox message {0} is already staged")]
    DuplicateMessage(Uuid),

    #[error("outbox forwarder is already running")]
    AlreadyRunning,

    #[error("{0}")]
    Domain(String),
}

impl EventError {
    /// Builds a handler failure carrying the handler name for log correlation.
    pub fn handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Builds a domain rule violation raised by an aggregate or service.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }

    /// Returns true when the underlying database error is a unique-key violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(e) => e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation()),
            Self::DuplicateMessage(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_message() {
        let err = EventError::handler("click-analytics", "boom");
        assert_eq!(err.to_string(), "handler `click-analytics` failed: boom");
    }

    #[test]
    fn test_bus_error_is_transparent() {
        let err: EventError = BusError::Closed.into();
        assert_eq!(err.to_string(), "event bus is closed");
    }

    #[test]
    fn test_duplicate_counts_as_unique_violation() {
        assert!(EventError::DuplicateMessage(Uuid::now_v7()).is_unique_violation());
        assert!(!EventError::AlreadyRunning.is_unique_violation());
    }
}
