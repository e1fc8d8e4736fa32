//! Configuration for Grapevine
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use uuid::Uuid;

/// Grapevine - social graph and notification engine
#[derive(Parser, Debug, Clone)]
#[command(name = "grapevine")]
#[command(about = "Social graph and notification engine for the catalog")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "grapevine")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Days a notification is kept before the retention sweep removes it
    #[arg(long, env = "RETENTION_DAYS", default_value = "90")]
    pub retention_days: u32,

    /// Seconds between maintenance sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "3600")]
    pub sweep_interval_secs: u64,

    /// Hours a rate entry is kept after falling out of every window
    #[arg(long, env = "RATE_MAX_AGE_HOURS", default_value = "24")]
    pub rate_max_age_hours: u64,

    /// Documents removed per sweep batch
    #[arg(long, env = "SWEEP_BATCH", default_value = "500")]
    pub sweep_batch: i64,

    /// Follow actions allowed per rate window
    #[arg(long, env = "FOLLOW_RATE_LIMIT", default_value = "30")]
    pub follow_rate_limit: u64,

    /// Follow rate window in seconds
    #[arg(long, env = "FOLLOW_RATE_WINDOW_SECS", default_value = "3600")]
    pub follow_rate_window_secs: u64,
}

impl Args {
    /// Follow rate window in milliseconds
    pub fn follow_rate_window_ms(&self) -> i64 {
        self.follow_rate_window_secs as i64 * 1000
    }

    /// Rate entry retention horizon in milliseconds
    pub fn rate_max_age_ms(&self) -> i64 {
        self.rate_max_age_hours as i64 * 3_600_000
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.retention_days == 0 {
            return Err("RETENTION_DAYS must be at least 1".to_string());
        }

        if self.sweep_interval_secs == 0 {
            return Err("SWEEP_INTERVAL_SECS must be at least 1".to_string());
        }

        // Zero would make the sweeper's cutoff "now" and evict live
        // in-window entries on every pass
        if self.rate_max_age_hours == 0 {
            return Err("RATE_MAX_AGE_HOURS must be at least 1".to_string());
        }

        if self.sweep_batch < 1 {
            return Err("SWEEP_BATCH must be at least 1".to_string());
        }

        if self.follow_rate_limit == 0 {
            return Err("FOLLOW_RATE_LIMIT must be at least 1".to_string());
        }

        if self.follow_rate_window_secs == 0 {
            return Err("FOLLOW_RATE_WINDOW_SECS must be at least 1".to_string());
        }

        Ok(())
    }
}
