//! Background task moving committed outbox rows onto the event bus.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::store::OutboxStore;
use crate::error::EventError;
use crate::events::EventBus;
use crate::shutdown::wait_for_shutdown;

/// Polling parameters.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub topic: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            batch_size: 100,
            topic: crate::events::DEFAULT_TOPIC.to_string(),
        }
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
}

struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Polls the outbox, publishes rows oldest first and deletes each row only
/// after its publish succeeded.
///
/// Delivery is at-least-once: a row whose delete fails after a successful
/// publish is published again on a later tick.
pub struct OutboxForwarder<S: OutboxStore + 'static> {
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    config: ForwarderConfig,
    running: Mutex<Option<Running>>,
}

impl<S: OutboxStore + 'static> OutboxForwarder<S> {
    pub fn new(store: Arc<S>, bus: Arc<dyn EventBus>, config: ForwarderConfig) -> Self {
        Self {
            store,
            bus,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Spawns the polling loop. It runs until `shutdown` fires or
    /// [`stop`](Self::stop) is called.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::AlreadyRunning`] if a loop is already active.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Result<(), EventError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(EventError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(
            self.store.clone(),
            self.bus.clone(),
            self.config.clone(),
            shutdown,
            stop_rx,
        ));

        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            topic = %self.config.topic,
            "Outbox forwarder started"
        );

        *running = Some(Running { stop_tx, handle });
        Ok(())
    }

    /// Signals the loop and waits for it to exit. A no-op if never started.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(Running { stop_tx, handle }) = running else {
            return;
        };

        stop_tx.send_replace(true);
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Outbox forwarder task failed");
        }
        tracing::info!("Outbox forwarder stopped");
    }

    /// Runs a single poll immediately.
    pub async fn tick(&self) -> Result<TickReport, EventError> {
        forward_batch(
            self.store.as_ref(),
            self.bus.as_ref(),
            &self.config.topic,
            self.config.batch_size,
        )
        .await
    }
}

async fn poll_loop<S: OutboxStore>(
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    config: ForwarderConfig,
    mut shutdown: watch::Receiver<bool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = wait_for_shutdown(&mut stop_rx) => break,
            _ = interval.tick() => {
                match forward_batch(store.as_ref(), bus.as_ref(), &config.topic, config.batch_size).await {
                    Ok(report) if report.fetched > 0 => tracing::debug!(
                        fetched = report.fetched,
                        published = report.published,
                        failed = report.failed,
                        "Outbox tick"
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Outbox query failed; retrying next tick"),
                }
            }
        }
    }
}

/// Publishes one batch. Only a failure to read the batch is an error; per-row
/// failures are logged and counted.
async fn forward_batch<S: OutboxStore + ?Sized>(
    store: &S,
    bus: &dyn EventBus,
    topic: &str,
    batch_size: usize,
) -> Result<TickReport, EventError> {
    let rows = store.fetch_pending(batch_size).await?;
    let mut report = TickReport {
        fetched: rows.len(),
        ..TickReport::default()
    };

    for row in rows {
        if let Err(e) = bus.publish(topic, row.to_message()).await {
            report.failed += 1;
            metrics::counter!("outbox_publish_failures_total").increment(1);
            tracing::warn!(uuid = %row.uuid, error = %e, "Failed to publish outbox message; will retry");
            continue;
        }

        report.published += 1;
        metrics::counter!("outbox_messages_published_total").increment(1);

        if let Err(e) = store.delete(row.uuid).await {
            tracing::warn!(
                uuid = %row.uuid,
                error = %e,
                "Published outbox message could not be deleted; it will be published again"
            );
        }
    }

    Ok(report)
}
