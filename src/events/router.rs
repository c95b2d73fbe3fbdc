//! Bus consumer that fans envelopes out to handlers by event name.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;

use super::bus::{Delivery, EventBus};
use super::envelope::Envelope;
use crate::error::EventError;
use crate::shutdown::wait_for_shutdown;

/// An out-of-process-style consumer of one event name.
///
/// The same `event_id` may be delivered more than once (the forwarder is
/// at-least-once and the bus broadcasts), so `handle` must be idempotent.
#[async_trait]
pub trait RouterHandler: Send + Sync {
    /// Name used in logs for correlation.
    fn handler_name(&self) -> &str;

    /// The single event name this handler consumes.
    fn event_name(&self) -> &str;

    async fn handle(&self, envelope: &Envelope) -> Result<(), EventError>;
}

/// Subscribes to a bus topic and dispatches each envelope to the handlers
/// registered for its event name.
///
/// Messages are processed one at a time. A failure in one handler never
/// prevents the others from running; any failure nacks the message.
pub struct Router {
    bus: Arc<dyn EventBus>,
    topic: String,
    handlers: Vec<Arc<dyn RouterHandler>>,
    stop_tx: watch::Sender<bool>,
    running_tx: watch::Sender<bool>,
}

impl Router {
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (running_tx, _) = watch::channel(false);

        Self {
            bus,
            topic: topic.into(),
            handlers: Vec::new(),
            stop_tx,
            running_tx,
        }
    }

    pub fn add_handler(&mut self, handler: Arc<dyn RouterHandler>) {
        tracing::debug!(
            handler = handler.handler_name(),
            event_name = handler.event_name(),
            "Router handler registered"
        );
        self.handlers.push(handler);
    }

    pub fn is_running(&self) -> bool {
        *self.running_tx.borrow()
    }

    /// Resolves once [`run`](Self::run) has subscribed and is consuming.
    pub async fn started(&self) {
        let mut running_rx = self.running_tx.subscribe();
        let _ = running_rx.wait_for(|running| *running).await;
    }

    /// Consumes the topic until `shutdown` fires, [`close`](Self::close) is
    /// called, or the bus closes.
    ///
    /// A delivery already being handled is finished before returning. If
    /// `close` was called before this run began consuming, it returns
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be opened.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), EventError> {
        let mut subscription = self.bus.subscribe(&self.topic).await?;
        let mut stop_rx = self.stop_tx.subscribe();

        if *stop_rx.borrow_and_update() {
            self.stop_tx.send_replace(false);
            tracing::info!(topic = %self.topic, "Router closed before it started");
            return Ok(());
        }

        self.running_tx.send_replace(true);
        tracing::info!(topic = %self.topic, handlers = self.handlers.len(), "Router started");

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = wait_for_shutdown(&mut stop_rx) => break,
                delivery = subscription.next() => match delivery {
                    Some(delivery) => self.process(delivery).await,
                    None => {
                        tracing::info!(topic = %self.topic, "Subscription ended");
                        break;
                    }
                },
            }
        }

        // the stop request is consumed by the run it ended
        self.stop_tx.send_replace(false);
        self.running_tx.send_replace(false);
        tracing::info!(topic = %self.topic, "Router stopped");
        Ok(())
    }

    /// Stops consumption and waits until a [`run`](Self::run) in progress has
    /// returned.
    ///
    /// The request is latched: a run that has not started consuming yet
    /// returns as soon as it subscribes.
    pub async fn close(&self) {
        let mut running_rx = self.running_tx.subscribe();
        self.stop_tx.send_replace(true);

        // the sender lives in self, so this cannot fail while we borrow it
        let _ = running_rx.wait_for(|running| !*running).await;
    }

    async fn process(&self, delivery: Delivery) {
        let envelope = match Envelope::from_bytes(&delivery.message().payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    message_uuid = %delivery.message().uuid,
                    error = %e,
                    "Dropping malformed message"
                );
                delivery.ack();
                return;
            }
        };

        let mut failed = false;

        for handler in self
            .handlers
            .iter()
            .filter(|h| h.event_name() == envelope.event_name)
        {
            let outcome = AssertUnwindSafe(handler.handle(&envelope))
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "handler panicked".to_string(),
            };

            failed = true;
            tracing::error!(
                handler = handler.handler_name(),
                event_name = %envelope.event_name,
                event_id = %envelope.event_id,
                error = %error,
                "Event handler failed"
            );
        }

        if failed {
            delivery.nack();
        } else {
            delivery.ack();
        }
    }
}
