//! Grapevine Sweeper - periodic maintenance for notifications and rate entries
//!
//! Runs the notification retention sweep and the rate-entry eviction sweep
//! against MongoDB on a fixed interval.
//!
//! Usage:
//!   grapevine-sweeper --mongodb-uri mongodb://localhost:27017
//!
//! Environment variables:
//!   MONGODB_URI - MongoDB connection URI (default: mongodb://localhost:27017)
//!   MONGODB_DB - Database name (default: grapevine)
//!   RETENTION_DAYS - Notification retention horizon (default: 90)
//!   RATE_MAX_AGE_HOURS - Rate entry retention horizon (default: 24)
//!   SWEEP_INTERVAL_SECS - Seconds between sweeps (default: 3600)
//!   SWEEP_BATCH - Documents removed per batch (default: 500)

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grapevine::{
    config::Args, content::NullContentResolver, db::MongoClient,
    identity::StoreIdentityResolver, notify::NotificationEngine, ratelimit::RateLimiter,
    store::MongoStores,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("grapevine={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let git_commit = option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown");
    let build_timestamp = option_env!("BUILD_TIMESTAMP").unwrap_or("unknown");

    info!("======================================");
    info!("  Grapevine Sweeper");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!(
        "Version: {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        git_commit,
        build_timestamp
    );
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Notification retention: {} days", args.retention_days);
    info!("Rate entry max age: {}h", args.rate_max_age_hours);
    info!("Sweep interval: {}s", args.sweep_interval_secs);
    info!("Sweep batch: {}", args.sweep_batch);
    info!("======================================");

    // The sweeper is pointless without a database
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => client,
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let stores = MongoStores::new(&mongo).await?;

    let identity = Arc::new(StoreIdentityResolver::new(stores.users.clone()));
    let engine = NotificationEngine::new(
        stores.notifications.clone(),
        stores.blocks.clone(),
        stores.users.clone(),
        identity,
        Arc::new(NullContentResolver),
    )
    .with_sweep_batch(args.sweep_batch);
    let limiter = RateLimiter::new(stores.rates.clone()).with_sweep_batch(args.sweep_batch);

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(args.sweep_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("Sweeper running");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed_notifications = engine.cleanup_old(args.retention_days).await;
                let removed_entries = limiter.cleanup_old_entries(args.rate_max_age_ms()).await;
                info!(
                    "Sweep complete: {} notifications, {} rate entries removed",
                    removed_notifications, removed_entries
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!("Sweeper shutting down");
    Ok(())
}
