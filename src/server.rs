//! Relay initialization and runtime setup.
//!
//! Handles the database connection, migrations, bus/router/forwarder wiring
//! and graceful shutdown.

use crate::config::Config;
use crate::events::{ClickAnalyticsHandler, EventBus, InMemoryBus, LinkEventLogger, Router};
use crate::outbox::{OutboxForwarder, PgOutboxStore};
use crate::shutdown;

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

/// Connection attempts before giving up at startup.
const CONNECT_ATTEMPTS: usize = 5;

/// Delays between connection attempts: 200 ms doubling up to 5 s, jittered.
fn connect_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(100)
        .max_delay(Duration::from_secs(5))
        .map(jitter)
        .take(CONNECT_ATTEMPTS - 1)
}

/// Opens the PostgreSQL pool, retrying with exponential backoff.
///
/// # Errors
///
/// Returns the last connection error once all attempts are exhausted.
pub async fn connect_pool(config: &Config) -> Result<PgPool> {
    let options = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime));

    let pool = Retry::start(connect_backoff(), || {
        let options = options.clone();
        async move {
            options
                .connect(&config.database_url)
                .await
                .inspect_err(|e| tracing::warn!(error = %e, "Database connection attempt failed"))
        }
    })
    .await
    .context("Failed to connect to database")?;

    tracing::info!("Connected to database");
    Ok(pool)
}

/// Runs the outbox relay until Ctrl-C.
///
/// Initializes:
/// - PostgreSQL connection pool
/// - Apply migrations
/// - In-memory event bus
/// - Router with the logging and click analytics handlers
/// - Outbox forwarder
///
/// On shutdown the forwarder stops first, then the router, then the bus.
///
/// # Errors
///
/// Returns an error if:
/// - Database connection or migration fails
/// - The router cannot subscribe to the bus
pub async fn run(config: Config) -> Result<()> {
    let pool = Arc::new(connect_pool(&config).await?);

    sqlx::migrate!("./migrations")
        .run(pool.as_ref())
        .await
        .context("Failed to run migrations")?;

    let bus = Arc::new(InMemoryBus::new());

    let mut router = Router::new(bus.clone(), config.event_topic.clone());
    LinkEventLogger::register_all(&mut router);
    router.add_handler(Arc::new(ClickAnalyticsHandler::new()));
    let router = Arc::new(router);

    let (shutdown_tx, shutdown_rx) = shutdown::channel();

    let mut router_task = {
        let router = router.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { router.run(shutdown_rx).await })
    };

    // the forwarder deletes what it publishes, so the router must be subscribed first
    tokio::select! {
        _ = router.started() => {}
        result = &mut router_task => {
            result.context("Router task failed")??;
            anyhow::bail!("Router exited before subscribing");
        }
    }

    let forwarder = OutboxForwarder::new(
        Arc::new(PgOutboxStore::new(pool.clone())),
        bus.clone(),
        config.forwarder(),
    );
    forwarder.start(shutdown_rx)?;

    tracing::info!(topic = %config.event_topic, "Relay running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    forwarder.stop().await;
    router.close().await;
    bus.close().await?;
    shutdown_tx.send_replace(true);

    if let Err(e) = router_task.await.context("Router task failed")? {
        tracing::error!(error = %e, "Router exited with error");
    }

    let stats = bus.stats();
    tracing::info!(
        acked = stats.acked(),
        nacked = stats.nacked(),
        "Relay stopped"
    );

    pool.close().await;
    Ok(())
}
