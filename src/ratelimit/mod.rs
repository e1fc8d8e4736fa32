//! Sliding-window rate limiter
//!
//! Counts accepted requests per key over a moving window backed by the rate
//! store. Check-then-record is not atomic across a shared store; two racing
//! callers at the boundary can both be admitted. That transient
//! over-admission is accepted, the window recovers on its own.

use std::sync::Arc;
use tracing::warn;

use crate::store::RateStore;
use crate::types::Result;

/// Default number of entries removed per sweep batch
const DEFAULT_SWEEP_BATCH: i64 = 500;

/// Outcome of a rate-limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted and recorded; `remaining` is the budget left in the
    /// current window after this request.
    Allowed { remaining: u64 },
    /// Request rejected and not recorded; retry once the oldest in-window
    /// entry has aged out.
    Denied { retry_after_ms: i64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Diagnostic snapshot of one key's window
#[derive(Debug, Clone)]
pub struct RateStatus {
    pub key: String,
    pub count: u64,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    /// Age of each in-window entry, youngest first
    pub entry_ages_ms: Vec<i64>,
}

/// Sliding-window limiter over a pluggable rate store
pub struct RateLimiter {
    store: Arc<dyn RateStore>,
    sweep_batch: i64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self {
            store,
            sweep_batch: DEFAULT_SWEEP_BATCH,
        }
    }

    pub fn with_sweep_batch(mut self, batch: i64) -> Self {
        self.sweep_batch = batch.max(1);
        self
    }

    /// Admit or reject one request for `key` under `limit` per `window_ms`
    pub async fn check_and_record(
        &self,
        key: &str,
        limit: u64,
        window_ms: i64,
    ) -> Result<RateDecision> {
        self.check_and_record_at(key, limit, window_ms, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Time-parameterized form of [`check_and_record`](Self::check_and_record)
    pub async fn check_and_record_at(
        &self,
        key: &str,
        limit: u64,
        window_ms: i64,
        now_ms: i64,
    ) -> Result<RateDecision> {
        let window_start = now_ms - window_ms;

        // Tidy this key's expired entries before counting
        self.store
            .evict_key_before(key, window_start, self.sweep_batch)
            .await?;

        let timestamps = self.store.timestamps_since(key, window_start).await?;
        let count = timestamps.len() as u64;

        if count >= limit {
            let retry_after_ms = timestamps
                .iter()
                .min()
                .map(|oldest| (oldest + window_ms - now_ms).max(0))
                .unwrap_or(window_ms);
            return Ok(RateDecision::Denied { retry_after_ms });
        }

        self.store.record(key, now_ms).await?;
        Ok(RateDecision::Allowed {
            remaining: limit - count - 1,
        })
    }

    /// Inspect one key's window without recording anything
    pub async fn status(&self, key: &str, window_ms: i64) -> Result<RateStatus> {
        self.status_at(key, window_ms, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Time-parameterized form of [`status`](Self::status)
    pub async fn status_at(&self, key: &str, window_ms: i64, now_ms: i64) -> Result<RateStatus> {
        let window_start = now_ms - window_ms;
        let timestamps = self.store.timestamps_since(key, window_start).await?;

        let mut entry_ages_ms: Vec<i64> = timestamps.iter().map(|ts| now_ms - ts).collect();
        entry_ages_ms.sort_unstable();

        Ok(RateStatus {
            key: key.to_string(),
            count: timestamps.len() as u64,
            window_start_ms: window_start,
            window_end_ms: now_ms,
            entry_ages_ms,
        })
    }

    /// Sweep entries older than the given horizon across every key.
    ///
    /// Returns the number of entries removed. Store failures end the sweep
    /// early with a warning; the next scheduled run picks up the remainder.
    pub async fn cleanup_old_entries(&self, older_than_ms: i64) -> u64 {
        self.cleanup_entries_before(chrono::Utc::now().timestamp_millis() - older_than_ms)
            .await
    }

    /// Time-parameterized form of [`cleanup_old_entries`](Self::cleanup_old_entries)
    pub async fn cleanup_entries_before(&self, cutoff_ms: i64) -> u64 {
        let mut removed = 0u64;
        loop {
            match self.store.evict_all_before(cutoff_ms, self.sweep_batch).await {
                Ok(batch_removed) => {
                    removed += batch_removed;
                    if batch_removed < self.sweep_batch as u64 {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Rate entry sweep stopped early: {}", e);
                    break;
                }
            }
        }
        removed
    }
}
