//! Process-local event bus with broadcast semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::bus::{Delivery, DeliveryStats, EventBus, Message, Subscription};
use crate::error::BusError;

/// In-memory [`EventBus`].
///
/// Every subscriber owns an unbounded queue, so [`publish`](EventBus::publish)
/// never waits on a slow consumer. Subscribers that dropped their
/// [`Subscription`] are pruned on the next publish to their topic.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>>,
    closed: Arc<AtomicBool>,
    stats: Arc<DeliveryStats>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ack/nack counters across all subscriptions.
    pub fn stats(&self) -> &DeliveryStats {
        &self.inner.stats
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers
            .get(topic)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(senders) = subscribers.get_mut(topic) else {
            tracing::debug!(topic, message_uuid = %message.uuid, "No subscribers for topic");
            return Ok(());
        };

        senders.retain(|tx| {
            tx.send(Delivery::new(message.clone(), self.inner.stats.clone()))
                .is_ok()
        });

        tracing::trace!(
            topic,
            message_uuid = %message.uuid,
            subscribers = senders.len(),
            "Message published"
        );

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        tracing::debug!(topic, "Subscriber registered");

        Ok(Subscription::new(rx, self.inner.closed.clone()))
    }

    async fn close(&self) -> Result<(), BusError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let dropped = {
            let mut subscribers = self
                .inner
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let count = subscribers.values().map(Vec::len).sum::<usize>();
            subscribers.clear();
            count
        };

        tracing::info!(subscriptions = dropped, "Event bus closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const TOPIC: &str = "test-topic";

    #[tokio::test]
    async fn test_every_subscriber_gets_a_copy() {
        let bus = InMemoryBus::new();
        let mut first = bus.subscribe(TOPIC).await.unwrap();
        let mut second = bus.subscribe(TOPIC).await.unwrap();

        bus.publish(TOPIC, Message::new("m1", b"1".to_vec()))
            .await
            .unwrap();

        assert_eq!(first.next().await.unwrap().message().uuid, "m1");
        assert_eq!(second.next().await.unwrap().message().uuid, "m1");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryBus::new();
        let mut other = bus.subscribe("other").await.unwrap();

        bus.publish(TOPIC, Message::new("m1", vec![])).await.unwrap();

        let received = timeout(Duration::from_millis(50), other.next()).await;
        assert!(received.is_err(), "subscriber of another topic got a message");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryBus::new();
        assert!(bus.publish(TOPIC, Message::new("m1", vec![])).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_does_not_wait_for_consumers() {
        let bus = InMemoryBus::new();
        let _idle = bus.subscribe(TOPIC).await.unwrap();

        for i in 0..1_000 {
            bus.publish(TOPIC, Message::new(format!("m{i}"), vec![]))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = InMemoryBus::new();
        let subscription = bus.subscribe(TOPIC).await.unwrap();
        assert_eq!(bus.subscriber_count(TOPIC), 1);

        drop(subscription);
        bus.publish(TOPIC, Message::new("m1", vec![])).await.unwrap();

        assert_eq!(bus.subscriber_count(TOPIC), 0);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions_and_drops_buffer() {
        let bus = InMemoryBus::new();
        let mut subscription = bus.subscribe(TOPIC).await.unwrap();

        bus.publish(TOPIC, Message::new("buffered", vec![]))
            .await
            .unwrap();
        bus.close().await.unwrap();

        assert!(subscription.next().await.is_none());
        assert!(bus.is_closed());
    }

    #[tokio::test]
    async fn test_publish_and_subscribe_after_close_fail() {
        let bus = InMemoryBus::new();
        bus.close().await.unwrap();

        assert!(matches!(
            bus.publish(TOPIC, Message::new("m1", vec![])).await,
            Err(BusError::Closed)
        ));
        assert!(matches!(bus.subscribe(TOPIC).await, Err(BusError::Closed)));
        assert!(bus.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_subscriber() {
        let bus = InMemoryBus::new();
        let mut subscription = bus.subscribe(TOPIC).await.unwrap();

        let waiter = tokio::spawn(async move { subscription.next().await.is_none() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.close().await.unwrap();

        assert!(timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap());
    }
}
