//! Events raised by the [`Link`](crate::domain::entities::Link) aggregate.
//!
//! The set of link events is closed: consumers match on [`LinkEvent`]
//! exhaustively, and anything arriving over the wire with a name not listed in
//! [`LinkEvent::NAMES`] is handled as an unknown event by the consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::event::{DomainEvent, new_event_id};

pub const LINK_CREATED: &str = "link.created";
pub const LINK_CLICKED: &str = "link.clicked";
pub const LINK_DELETED: &str = "link.deleted";

/// Fields common to every link event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub event_id: Uuid,
    pub link_code: String,
    pub occurred_at: DateTime<Utc>,
}

impl EventMeta {
    fn now(link_code: &str) -> Self {
        Self {
            event_id: new_event_id(),
            link_code: link_code.to_string(),
            occurred_at: Utc::now(),
        }
    }
}

/// Payload of `link.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCreated {
    pub code: String,
    pub long_url: String,
}

/// Payload of `link.clicked`.
///
/// Mirrors the request metadata the redirect handler captures; every field is
/// optional because clients may omit the headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkClicked {
    pub code: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub ip: Option<String>,
}

/// Payload of `link.deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDeleted {
    pub code: String,
}

/// A link domain event: shared metadata plus one of the known payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Created(EventMeta, LinkCreated),
    Clicked(EventMeta, LinkClicked),
    Deleted(EventMeta, LinkDeleted),
}

impl LinkEvent {
    /// Every event name this enum can produce.
    pub const NAMES: [&'static str; 3] = [LINK_CREATED, LINK_CLICKED, LINK_DELETED];

    pub fn created(code: &str, long_url: &str) -> Self {
        Self::Created(
            EventMeta::now(code),
            LinkCreated {
                code: code.to_string(),
                long_url: long_url.to_string(),
            },
        )
    }

    pub fn clicked(click: LinkClicked) -> Self {
        Self::Clicked(EventMeta::now(&click.code), click)
    }

    pub fn deleted(code: &str) -> Self {
        Self::Deleted(
            EventMeta::now(code),
            LinkDeleted {
                code: code.to_string(),
            },
        )
    }

    /// Overrides the occurrence time, e.g. when replaying a recorded click.
    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        match &mut self {
            Self::Created(meta, _) | Self::Clicked(meta, _) | Self::Deleted(meta, _) => {
                meta.occurred_at = occurred_at;
            }
        }
        self
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            Self::Created(meta, _) | Self::Clicked(meta, _) | Self::Deleted(meta, _) => meta,
        }
    }

    /// Rebuilds a typed event from its routing name and JSON payload.
    ///
    /// Returns `Ok(None)` for names outside [`Self::NAMES`].
    pub fn from_parts(
        meta: EventMeta,
        event_name: &str,
        payload: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        let event = match event_name {
            LINK_CREATED => Self::Created(meta, serde_json::from_value(payload)?),
            LINK_CLICKED => Self::Clicked(meta, serde_json::from_value(payload)?),
            LINK_DELETED => Self::Deleted(meta, serde_json::from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl DomainEvent for LinkEvent {
    fn event_id(&self) -> Uuid {
        self.meta().event_id
    }

    fn event_name(&self) -> &str {
        match self {
            Self::Created(..) => LINK_CREATED,
            Self::Clicked(..) => LINK_CLICKED,
            Self::Deleted(..) => LINK_DELETED,
        }
    }

    fn aggregate_id(&self) -> &str {
        &self.meta().link_code
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.meta().occurred_at
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Created(_, body) => serde_json::to_value(body),
            Self::Clicked(_, body) => serde_json::to_value(body),
            Self::Deleted(_, body) => serde_json::to_value(body),
        }
    }
}
