//! Built-in consumers of link events.
//!
//! - [`LinkEventLogger`] - Router handler that logs every link event
//! - [`ClickAnalyticsHandler`] - Router handler aggregating clicks by device and referrer
//! - [`ClickCounter`] - In-process projection counting clicks per link

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::dispatcher::{Dispatcher, EventHandler};
use super::envelope::Envelope;
use super::router::{Router, RouterHandler};
use crate::domain::enrichment::{DeviceClass, classify_device, referrer_host};
use crate::domain::link_events::{LINK_CLICKED, LinkClicked, LinkEvent};
use crate::error::EventError;

/// Logs link events delivered through the router.
///
/// One instance is registered per event name; see [`LinkEventLogger::register_all`].
pub struct LinkEventLogger {
    event_name: String,
}

impl LinkEventLogger {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
        }
    }

    /// Registers a logger for every known link event name.
    pub fn register_all(router: &mut Router) {
        for name in LinkEvent::NAMES {
            router.add_handler(Arc::new(Self::new(name)));
        }
    }
}

#[async_trait]
impl RouterHandler for LinkEventLogger {
    fn handler_name(&self) -> &str {
        "link-event-logger"
    }

    fn event_name(&self) -> &str {
        &self.event_name
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), EventError> {
        match envelope.to_link_event()? {
            Some(LinkEvent::Created(meta, body)) => tracing::info!(
                event_id = %meta.event_id,
                code = %body.code,
                long_url = %body.long_url,
                "Link created"
            ),
            Some(LinkEvent::Clicked(meta, body)) => tracing::info!(
                event_id = %meta.event_id,
                code = %body.code,
                referer = body.referer.as_deref().unwrap_or("-"),
                "Link clicked"
            ),
            Some(LinkEvent::Deleted(meta, body)) => tracing::info!(
                event_id = %meta.event_id,
                code = %body.code,
                "Link deleted"
            ),
            None => tracing::warn!(
                event_id = %envelope.event_id,
                event_name = %envelope.event_name,
                "Unknown event kind"
            ),
        }
        Ok(())
    }
}

/// Click totals grouped by enrichment dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickReport {
    pub total: u64,
    pub by_device: HashMap<DeviceClass, u64>,
    pub by_referrer: HashMap<String, u64>,
}

/// Number of recent click ids remembered for de-duplication.
pub const DEFAULT_DEDUP_WINDOW: usize = 10_000;

/// Remembers the most recent `capacity` event ids; older ids are forgotten
/// first.
struct RecentIds {
    capacity: usize,
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ids: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns `false` if `id` is still remembered.
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.ids.remove(&oldest);
        }
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

struct AnalyticsState {
    seen: RecentIds,
    per_link: HashMap<String, ClickReport>,
}

/// Aggregates `link.clicked` envelopes by device class and referrer host.
///
/// Idempotent within a window: an `event_id` among the last
/// [`DEFAULT_DEDUP_WINDOW`] clicks is acknowledged without counting twice.
/// A duplicate older than the window is counted again.
#[derive(Clone)]
pub struct ClickAnalyticsHandler {
    state: Arc<Mutex<AnalyticsState>>,
}

impl Default for ClickAnalyticsHandler {
    fn default() -> Self {
        Self::with_dedup_window(DEFAULT_DEDUP_WINDOW)
    }
}

impl ClickAnalyticsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers at most `window` click ids for de-duplication.
    pub fn with_dedup_window(window: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(AnalyticsState {
                seen: RecentIds::new(window),
                per_link: HashMap::new(),
            })),
        }
    }

    /// Number of click ids currently remembered.
    pub fn remembered_ids(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seen
            .len()
    }

    /// Current totals for one short code.
    pub fn report(&self, code: &str) -> Option<ClickReport> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .per_link
            .get(code)
            .cloned()
    }
}

#[async_trait]
impl RouterHandler for ClickAnalyticsHandler {
    fn handler_name(&self) -> &str {
        "click-analytics"
    }

    fn event_name(&self) -> &str {
        LINK_CLICKED
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), EventError> {
        let click: LinkClicked = envelope.decode_payload()?;
        let device = classify_device(click.user_agent.as_deref());
        let referrer = referrer_host(click.referer.as_deref()).unwrap_or_else(|| "direct".into());

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.seen.insert(envelope.event_id) {
            tracing::debug!(event_id = %envelope.event_id, "Duplicate click ignored");
            return Ok(());
        }

        tracing::debug!(
            event_id = %envelope.event_id,
            code = %click.code,
            device = device.as_str(),
            referrer = %referrer,
            "Click counted"
        );
        let report = state.per_link.entry(click.code).or_default();
        report.total += 1;
        *report.by_device.entry(device).or_default() += 1;
        *report.by_referrer.entry(referrer).or_default() += 1;

        Ok(())
    }
}

/// In-process projection: click count per short code, updated right after
/// the committing transaction.
#[derive(Clone, Default)]
pub struct ClickCounter {
    counts: Arc<Mutex<HashMap<String, u64>>>,
}

impl ClickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, code: &str) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .copied()
            .unwrap_or(0)
    }

    /// Registers this projection on `dispatcher`.
    pub fn register(&self, dispatcher: &mut Dispatcher<LinkEvent>) {
        dispatcher.register(LINK_CLICKED, Arc::new(self.clone()));
    }
}

#[async_trait]
impl EventHandler<LinkEvent> for ClickCounter {
    async fn handle(&self, event: &LinkEvent) -> Result<(), EventError> {
        if let LinkEvent::Clicked(_, click) = event {
            *self
                .counts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(click.code.clone())
                .or_default() += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::link_events::LINK_CREATED;

    fn click_envelope(code: &str, ua: &str, referer: Option<&str>) -> Envelope {
        let event = LinkEvent::clicked(LinkClicked {
            code: code.to_string(),
            user_agent: Some(ua.to_string()),
            referer: referer.map(str::to_string),
            ip: None,
        });
        Envelope::from_event(&event).unwrap()
    }

    #[tokio::test]
    async fn test_analytics_aggregates_by_dimension() {
        let handler = ClickAnalyticsHandler::new();

        handler
            .handle(&click_envelope(
                "abc",
                "Mozilla/5.0 (Windows NT 10.0)",
                Some("https://www.google.com/"),
            ))
            .await
            .unwrap();
        handler
            .handle(&click_envelope("abc", "Mozilla/5.0 (iPhone) Mobile", None))
            .await
            .unwrap();

        let report = handler.report("abc").unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.by_device[&DeviceClass::Desktop], 1);
        assert_eq!(report.by_device[&DeviceClass::Mobile], 1);
        assert_eq!(report.by_referrer["google.com"], 1);
        assert_eq!(report.by_referrer["direct"], 1);
    }

    #[tokio::test]
    async fn test_analytics_is_idempotent_by_event_id() {
        let handler = ClickAnalyticsHandler::new();
        let envelope = click_envelope("abc", "curl/8.0", None);

        handler.handle(&envelope).await.unwrap();
        handler.handle(&envelope).await.unwrap();

        assert_eq!(handler.report("abc").unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_analytics_dedup_memory_is_bounded() {
        let handler = ClickAnalyticsHandler::with_dedup_window(2);
        let first = click_envelope("abc", "curl/8.0", None);

        handler.handle(&first).await.unwrap();
        for _ in 0..3 {
            handler
                .handle(&click_envelope("abc", "curl/8.0", None))
                .await
                .unwrap();
        }
        assert_eq!(handler.remembered_ids(), 2);
        assert_eq!(handler.report("abc").unwrap().total, 4);

        // recent ids are still recognized
        let recent = click_envelope("abc", "curl/8.0", None);
        handler.handle(&recent).await.unwrap();
        handler.handle(&recent).await.unwrap();
        assert_eq!(handler.report("abc").unwrap().total, 5);
        assert_eq!(handler.remembered_ids(), 2);
    }

    #[tokio::test]
    async fn test_analytics_rejects_foreign_payload() {
        let handler = ClickAnalyticsHandler::new();
        let mut envelope = click_envelope("abc", "curl/8.0", None);
        envelope.payload = serde_json::json!(["not", "a", "click"]);

        assert!(handler.handle(&envelope).await.is_err());
        assert!(handler.report("abc").is_none());
    }

    #[tokio::test]
    async fn test_logger_accepts_unknown_event_names() {
        let logger = LinkEventLogger::new("link.archived");
        let mut envelope =
            Envelope::from_event(&LinkEvent::created("abc", "https://example.com")).unwrap();
        envelope.event_name = "link.archived".to_string();

        assert!(logger.handle(&envelope).await.is_ok());
    }

    #[tokio::test]
    async fn test_logger_rejects_malformed_known_payload() {
        let logger = LinkEventLogger::new(LINK_CREATED);
        let mut envelope =
            Envelope::from_event(&LinkEvent::created("abc", "https://example.com")).unwrap();
        envelope.payload = serde_json::json!({ "code": 42 });

        assert!(logger.handle(&envelope).await.is_err());
    }

    #[tokio::test]
    async fn test_click_counter_projection() {
        let counter = ClickCounter::new();
        let mut dispatcher = Dispatcher::new();
        counter.register(&mut dispatcher);

        let click = LinkClicked {
            code: "abc".to_string(),
            ..Default::default()
        };
        dispatcher
            .dispatch_all(&[
                LinkEvent::clicked(click.clone()),
                LinkEvent::clicked(click),
                LinkEvent::created("abc", "https://example.com"),
            ])
            .await
            .unwrap();

        assert_eq!(counter.count("abc"), 2);
        assert_eq!(counter.count("missing"), 0);
    }
}
