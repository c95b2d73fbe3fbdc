//! CLI administration tool for the link event outbox.
//!
//! Inspects and drains the `outbox_messages` table without running the relay.
//!
//! # Usage
//!
//! ```bash
//! # Backlog size and age
//! cargo run --bin admin -- outbox stats
//!
//! # Show the next rows the forwarder would publish
//! cargo run --bin admin -- outbox peek --limit 20
//!
//! # Publish one batch to a logging consumer and delete it
//! cargo run --bin admin -- outbox drain
//!
//! # Link, click and outbox counts
//! cargo run --bin admin -- stats
//!
//! # Check database connection
//! cargo run --bin admin -- db check
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` (required): PostgreSQL connection string

use link_events::events::{
    EventBus, InMemoryBus, LinkEventLogger, META_AGGREGATE_ID, META_EVENT_NAME, Router,
};
use link_events::outbox::{ForwarderConfig, OutboxForwarder, OutboxStore, PgOutboxStore};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::*;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// CLI tool for inspecting the link event outbox.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Top-level command groups.
#[derive(Subcommand)]
enum Commands {
    /// Inspect or drain the outbox
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },

    /// Show statistics
    Stats,

    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

/// Outbox subcommands.
#[derive(Subcommand)]
enum OutboxAction {
    /// Show pending row count and the oldest row's age
    Stats,

    /// List the oldest pending rows without publishing them
    Peek {
        /// Number of rows to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Publish one batch to a logging consumer, deleting what was published
    Drain {
        /// Maximum rows to publish
        #[arg(short, long, default_value_t = 100)]
        batch_size: usize,
    },
}

/// Database operation subcommands.
#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,

    /// Show database info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = PgPool::connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Outbox { action } => handle_outbox_action(action, &pool).await?,
        Commands::Stats => handle_stats(&pool).await?,
        Commands::Db { action } => handle_db_action(action, &pool).await?,
    }

    pool.close().await;
    Ok(())
}

async fn handle_outbox_action(action: OutboxAction, pool: &PgPool) -> Result<()> {
    let store = Arc::new(PgOutboxStore::new(Arc::new(pool.clone())));

    match action {
        OutboxAction::Stats => outbox_stats(store.as_ref()).await,
        OutboxAction::Peek { limit } => peek(store.as_ref(), limit).await,
        OutboxAction::Drain { batch_size } => drain(store, batch_size).await,
    }
}

async fn outbox_stats(store: &PgOutboxStore) -> Result<()> {
    println!("{}", "📦 Outbox".bright_blue().bold());
    println!();

    let stats = store.stats().await?;

    println!(
        "  Pending:    {}",
        stats.pending.to_string().bright_green().bold()
    );

    match stats.oldest_created_at {
        Some(oldest) => {
            let age = Utc::now().signed_duration_since(oldest);
            println!(
                "  Oldest:     {} ({}s ago)",
                oldest.to_rfc3339().bright_white(),
                age.num_seconds().max(0).to_string().yellow()
            );
        }
        None => println!("  Oldest:     {}", "-".bright_black()),
    }
    println!();

    Ok(())
}

async fn peek(store: &PgOutboxStore, limit: usize) -> Result<()> {
    println!("{}", "🔎 Pending outbox rows".bright_blue().bold());
    println!();

    let rows = store.fetch_pending(limit).await?;

    if rows.is_empty() {
        println!("{}", "  Outbox is empty".yellow());
        println!();
        return Ok(());
    }

    println!(
        "  {:<38} {:<16} {:<20} {}",
        "UUID".bright_white().bold(),
        "Event".bright_white().bold(),
        "Aggregate".bright_white().bold(),
        "Created".bright_white().bold()
    );
    println!("  {}", "─".repeat(100).bright_black());

    for row in &rows {
        let event_name = row.metadata.get(META_EVENT_NAME).map_or("?", String::as_str);
        let aggregate_id = row
            .metadata
            .get(META_AGGREGATE_ID)
            .map_or("?", String::as_str);

        println!(
            "  {:<38} {:<16} {:<20} {}",
            row.uuid.to_string().bright_black(),
            event_name.cyan(),
            aggregate_id,
            row.created_at.format("%Y-%m-%d %H:%M:%S%.3f")
        );
    }

    println!();
    println!("  Showing {} row(s)", rows.len().to_string().bright_green());
    println!();

    Ok(())
}

/// Runs a single forwarder tick against an in-memory bus with a logging
/// router attached.
async fn drain(store: Arc<PgOutboxStore>, batch_size: usize) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("{}", "🚚 Draining outbox".bright_blue().bold());
    println!();

    let config = ForwarderConfig {
        batch_size,
        ..ForwarderConfig::default()
    };

    let bus = Arc::new(InMemoryBus::new());
    let mut router = Router::new(bus.clone(), config.topic.clone());
    LinkEventLogger::register_all(&mut router);
    let router = Arc::new(router);

    let (shutdown_tx, shutdown_rx) = link_events::shutdown::channel();
    let router_task = {
        let router = router.clone();
        tokio::spawn(async move { router.run(shutdown_rx).await })
    };
    router.started().await;

    let forwarder = OutboxForwarder::new(store, bus.clone(), config);
    let report = forwarder.tick().await;

    // let the router finish what was just published
    while bus.stats().acked() + bus.stats().nacked()
        < report.as_ref().map_or(0, |r| r.published as u64)
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    router.close().await;
    bus.close().await?;
    shutdown_tx.send_replace(true);
    router_task.await.context("Router task failed")??;

    let report = report?;

    println!();
    println!("  Fetched:   {}", report.fetched.to_string().bright_white());
    println!(
        "  Published: {}",
        report.published.to_string().bright_green().bold()
    );
    if report.failed > 0 {
        println!("  Failed:    {}", report.failed.to_string().red().bold());
    }
    println!();
    println!("{}", "✅ Drain complete".green().bold());
    println!();

    Ok(())
}

/// Displays system statistics.
///
/// Shows:
/// - Total number of links
/// - Total number of clicks
/// - Number of pending outbox rows
async fn handle_stats(pool: &PgPool) -> Result<()> {
    println!("{}", "📊 Statistics".bright_blue().bold());
    println!();

    let links_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links")
        .fetch_one(pool)
        .await?;

    let deleted_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM links WHERE deleted_at IS NOT NULL")
            .fetch_one(pool)
            .await?;

    let clicks_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM link_clicks")
        .fetch_one(pool)
        .await?;

    let pending_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox_messages")
        .fetch_one(pool)
        .await?;

    println!(
        "  Links:          {}",
        links_count.to_string().bright_green().bold()
    );
    println!(
        "  Deleted links:  {}",
        deleted_count.to_string().bright_black()
    );
    println!(
        "  Clicks:         {}",
        clicks_count.to_string().bright_green().bold()
    );
    println!(
        "  Pending events: {}",
        pending_count.to_string().yellow().bold()
    );
    println!();

    Ok(())
}

/// Handles database diagnostic commands.
async fn handle_db_action(action: DbAction, pool: &PgPool) -> Result<()> {
    match action {
        DbAction::Check => {
            println!("{}", "🔍 Checking database connection...".bright_blue());

            sqlx::query("SELECT 1").fetch_one(pool).await?;

            println!("{}", "✅ Database connection OK".green().bold());
        }
        DbAction::Info => {
            println!("{}", "ℹ️  Database Information".bright_blue().bold());
            println!();

            let version: String = sqlx::query_scalar("SELECT version()")
                .fetch_one(pool)
                .await?;

            println!("  PostgreSQL: {}", version.bright_white());
            println!();
        }
    }

    Ok(())
}
