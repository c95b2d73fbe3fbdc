//! Link aggregate representing a shortened URL mapping.

use chrono::{DateTime, Utc};

use crate::domain::aggregate::{AggregateRoot, EventBuffer};
use crate::domain::link_events::{LinkClicked, LinkEvent};
use crate::error::EventError;

/// A shortened URL link.
///
/// Every state change records a [`LinkEvent`]. The events stay pending until the
/// unit of work that persisted the change has committed.
#[derive(Debug, Clone)]
pub struct Link {
    pub code: String,
    pub long_url: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    events: EventBuffer<LinkEvent>,
}

impl Link {
    /// Creates a new link and records `link.created`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Domain`] if the code or URL is empty.
    pub fn create(code: impl Into<String>, long_url: impl Into<String>) -> Result<Self, EventError> {
        let code = code.into();
        let long_url = long_url.into();

        if code.trim().is_empty() {
            return Err(EventError::domain("Short code must not be empty"));
        }
        if long_url.trim().is_empty() {
            return Err(EventError::domain("Long URL must not be empty"));
        }

        let event = LinkEvent::created(&code, &long_url);
        let mut events = EventBuffer::new();
        let created_at = event.meta().occurred_at;
        events.record(event);

        Ok(Self {
            code,
            long_url,
            created_at,
            deleted_at: None,
            events,
        })
    }

    /// Rebuilds a persisted link without recording any event.
    pub fn restore(
        code: String,
        long_url: String,
        created_at: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            code,
            long_url,
            created_at,
            deleted_at,
            events: EventBuffer::new(),
        }
    }

    /// Returns true if the link has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Records a redirect through this link.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Domain`] if the link is deleted.
    pub fn record_click(
        &mut self,
        user_agent: Option<&str>,
        referer: Option<&str>,
        ip: Option<String>,
    ) -> Result<&LinkEvent, EventError> {
        if self.is_deleted() {
            return Err(EventError::domain(format!(
                "Link `{}` is deleted",
                self.code
            )));
        }

        self.events.record(LinkEvent::clicked(LinkClicked {
            code: self.code.clone(),
            user_agent: user_agent.map(str::to_string),
            referer: referer.map(str::to_string),
            ip,
        }));

        Ok(self.last_event())
    }

    /// Soft-deletes the link. Deleting twice is a no-op.
    pub fn delete(&mut self) {
        if self.is_deleted() {
            return;
        }

        let event = LinkEvent::deleted(&self.code);
        self.deleted_at = Some(event.meta().occurred_at);
        self.events.record(event);
    }

    fn last_event(&self) -> &LinkEvent {
        // record() was called just before
        &self.events.as_slice()[self.events.len() - 1]
    }
}

impl AggregateRoot for Link {
    type Event = LinkEvent;

    fn events(&self) -> &[LinkEvent] {
        self.events.as_slice()
    }

    fn clear_events(&mut self) {
        self.events.clear();
    }
}
