mod common;

use common::{
    Behavior, FlakyBus, FlakyDeleteStore, RecordingHandler, RunningRouter, TOPIC, link_service,
    next_envelope, wait_until,
};
use link_events::domain::link_events::{LINK_CLICKED, LINK_CREATED};
use link_events::events::{ClickAnalyticsHandler, EventBus, InMemoryBus, Router};
use link_events::outbox::{ForwarderConfig, InMemoryOutbox, OutboxForwarder};
use link_events::prelude::ClickInfo;
use std::sync::Arc;
use std::time::Duration;

fn config() -> ForwarderConfig {
    ForwarderConfig {
        poll_interval: Duration::from_millis(10),
        batch_size: 100,
        topic: TOPIC.to_string(),
    }
}

#[tokio::test]
async fn test_created_link_reaches_router_handler() {
    let outbox = InMemoryOutbox::new();
    let service = link_service(&outbox);
    let bus = Arc::new(InMemoryBus::new());

    let handler = RecordingHandler::new("recorder", LINK_CREATED, Behavior::Succeed);
    let mut router = Router::new(bus.clone(), TOPIC);
    router.add_handler(handler.clone());
    let running = RunningRouter::start(router).await;

    service
        .create_link("abc123", "https://example.com")
        .await
        .unwrap();
    let staged = outbox.rows();
    assert_eq!(staged.len(), 1);

    let forwarder = OutboxForwarder::new(Arc::new(outbox.clone()), bus.clone(), config());
    let report = forwarder.tick().await.unwrap();
    assert_eq!(report.published, 1);

    wait_until(|| handler.seen().len() == 1).await;
    assert_eq!(handler.seen(), vec![staged[0].uuid]);
    assert!(outbox.is_empty());

    running.shutdown().await;
}

#[tokio::test]
async fn test_background_forwarder_delivers_and_drains() {
    let outbox = InMemoryOutbox::new();
    let service = link_service(&outbox);
    let bus = Arc::new(InMemoryBus::new());

    let analytics = ClickAnalyticsHandler::new();
    let mut router = Router::new(bus.clone(), TOPIC);
    router.add_handler(Arc::new(analytics.clone()));
    let running = RunningRouter::start(router).await;

    let forwarder = OutboxForwarder::new(Arc::new(outbox.clone()), bus.clone(), config());
    let (shutdown_tx, shutdown_rx) = link_events::shutdown::channel();
    forwarder.start(shutdown_rx).unwrap();

    service
        .create_link("abc", "https://example.com")
        .await
        .unwrap();
    for _ in 0..3 {
        service
            .record_click(
                "abc",
                ClickInfo {
                    user_agent: Some("Mozilla/5.0 (Windows NT 10.0)".to_string()),
                    referer: Some("https://www.google.com/search".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    wait_until(|| analytics.report("abc").is_some_and(|r| r.total == 3)).await;
    wait_until(|| outbox.is_empty()).await;

    let report = analytics.report("abc").unwrap();
    assert_eq!(report.by_referrer.get("google.com"), Some(&3));

    forwarder.stop().await;
    shutdown_tx.send_replace(true);
    running.shutdown().await;
}

#[tokio::test]
async fn test_publish_failure_is_retried_without_loss() {
    let outbox = InMemoryOutbox::new();
    let service = link_service(&outbox);
    let inner = InMemoryBus::new();
    let bus = Arc::new(FlakyBus::new(inner.clone()));
    let mut subscription = inner.subscribe(TOPIC).await.unwrap();

    service
        .create_link("abc", "https://example.com")
        .await
        .unwrap();
    let uuid = outbox.rows()[0].uuid;
    bus.fail(uuid, 2);

    let forwarder = OutboxForwarder::new(Arc::new(outbox.clone()), bus.clone(), config());

    for _ in 0..2 {
        let report = forwarder.tick().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(outbox.contains(uuid));
    }

    let report = forwarder.tick().await.unwrap();
    assert_eq!(report.published, 1);
    assert!(outbox.is_empty());

    let envelope = next_envelope(&mut subscription).await;
    assert_eq!(envelope.event_id, uuid);
}

#[tokio::test]
async fn test_failed_delete_causes_duplicate_not_loss() {
    let outbox = InMemoryOutbox::new();
    let service = link_service(&outbox);
    let bus = Arc::new(InMemoryBus::new());
    let mut subscription = bus.subscribe(TOPIC).await.unwrap();

    service
        .create_link("abc", "https://example.com")
        .await
        .unwrap();
    service
        .record_click("abc", ClickInfo::default())
        .await
        .unwrap();
    let click_id = outbox.rows()[1].uuid;

    let store = Arc::new(FlakyDeleteStore::new(outbox.clone(), 2));
    let forwarder = OutboxForwarder::new(store, bus.clone(), config());

    // both deletes fail: both rows stay and are published again
    assert_eq!(forwarder.tick().await.unwrap().published, 2);
    assert_eq!(outbox.len(), 2);
    assert_eq!(forwarder.tick().await.unwrap().published, 2);
    assert!(outbox.is_empty());

    let mut clicks = Vec::new();
    for _ in 0..4 {
        let envelope = next_envelope(&mut subscription).await;
        if envelope.event_name == LINK_CLICKED {
            clicks.push(envelope.event_id);
        }
    }
    assert_eq!(clicks, vec![click_id, click_id]);
}

#[tokio::test]
async fn test_duplicate_delivery_is_counted_once_by_analytics() {
    let outbox = InMemoryOutbox::new();
    let service = link_service(&outbox);
    let bus = Arc::new(InMemoryBus::new());

    let analytics = ClickAnalyticsHandler::new();
    let mut router = Router::new(bus.clone(), TOPIC);
    router.add_handler(Arc::new(analytics.clone()));
    let running = RunningRouter::start(router).await;

    service
        .create_link("abc", "https://example.com")
        .await
        .unwrap();
    service
        .record_click("abc", ClickInfo::default())
        .await
        .unwrap();

    let store = Arc::new(FlakyDeleteStore::new(outbox.clone(), 2));
    let forwarder = OutboxForwarder::new(store, bus.clone(), config());
    forwarder.tick().await.unwrap();
    forwarder.tick().await.unwrap();

    wait_until(|| bus.stats().acked() == 4).await;
    assert_eq!(analytics.report("abc").map(|r| r.total), Some(1));

    running.shutdown().await;
}

#[tokio::test]
async fn test_rolled_back_operation_publishes_nothing() {
    let outbox = InMemoryOutbox::new();
    let service = link_service(&outbox);
    let bus = Arc::new(InMemoryBus::new());
    let mut subscription = bus.subscribe(TOPIC).await.unwrap();

    let result = service.record_click("missing", ClickInfo::default()).await;
    assert!(result.is_err());

    let forwarder = OutboxForwarder::new(Arc::new(outbox.clone()), bus.clone(), config());
    let report = forwarder.tick().await.unwrap();
    assert_eq!(report.fetched, 0);

    let nothing = tokio::time::timeout(Duration::from_millis(50), subscription.next()).await;
    assert!(nothing.is_err());
}
