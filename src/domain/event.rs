//! Domain event contract shared by every event the link domain raises.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Something that happened to an aggregate.
///
/// Implementations are immutable values: every accessor returns data fixed at
/// construction time. `event_id` is a UUIDv7, so sorting by id approximates the
/// order in which events occurred.
pub trait DomainEvent: Send + Sync {
    /// Globally unique, time-ordered identifier.
    fn event_id(&self) -> Uuid;

    /// Stable name used for routing (e.g. `link.created`).
    fn event_name(&self) -> &str;

    /// Identifier of the aggregate that raised the event.
    fn aggregate_id(&self) -> &str;

    /// When the event occurred (UTC).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Event-specific body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be represented as JSON.
    fn payload(&self) -> Result<serde_json::Value, serde_json::Error>;
}

/// Generates a new time-ordered event identifier.
pub fn new_event_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_time_ordered() {
        let ids: Vec<Uuid> = (0..64).map(|_| new_event_id()).collect();

        let mut sorted = ids.clone();
        sorted.sort();

        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_event_ids_are_v7() {
        assert_eq!(new_event_id().get_version_num(), 7);
    }
}
