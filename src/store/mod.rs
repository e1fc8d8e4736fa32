//! Persistence traits for the social graph
//!
//! Every service talks to storage through these traits - allows swapping
//! implementations (MongoDB for prod, in-memory for dev and tests). The
//! contracts the services rely on live here: pair uniqueness surfaces as
//! [`InsertOutcome::Duplicate`], listings are newest-first with keyset
//! cursors, and sweeps are bounded by explicit batch limits.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::db::schemas::{BlockEdgeDoc, FollowEdgeDoc, NotificationDoc, UserDoc};
use crate::types::{GrapevineError, Result};

pub mod memory;
pub mod mongo;

pub use memory::{
    MemoryBlockStore, MemoryFollowStore, MemoryNotificationStore, MemoryRateStore,
    MemoryStores, MemoryUserStore,
};
pub use mongo::{
    MongoBlockStore, MongoFollowStore, MongoNotificationStore, MongoRateStore, MongoStores,
    MongoUserStore,
};

// =============================================================================
// Paging
// =============================================================================

/// Hard cap on page sizes across every listing
pub const MAX_PAGE_SIZE: i64 = 100;

/// Keyset cursor over `(created_at, id)`.
///
/// Pages are ordered newest-first; the cursor pins the position after the
/// last returned record, so rows inserted at the head later never shift an
/// already-issued cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Creation time of the last returned record, epoch milliseconds
    pub ts_ms: i64,
    /// Id of the last returned record, tie-breaker within a millisecond
    pub id: String,
}

impl Cursor {
    pub fn new(ts_ms: i64, id: impl Into<String>) -> Self {
        Self {
            ts_ms,
            id: id.into(),
        }
    }

    /// Opaque token form handed to callers
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}", self.ts_ms, self.id))
    }

    /// Parse a caller-supplied token
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| GrapevineError::BadRequest("malformed cursor".to_string()))?;
        let raw = String::from_utf8(bytes)
            .map_err(|_| GrapevineError::BadRequest("malformed cursor".to_string()))?;

        let (ts, id) = raw
            .split_once(':')
            .ok_or_else(|| GrapevineError::BadRequest("malformed cursor".to_string()))?;
        let ts_ms: i64 = ts
            .parse()
            .map_err(|_| GrapevineError::BadRequest("malformed cursor".to_string()))?;

        Ok(Self::new(ts_ms, id))
    }

    /// Decode an optional caller token
    pub fn decode_opt(token: Option<&str>) -> Result<Option<Self>> {
        token.map(Self::decode).transpose()
    }
}

/// One page of results plus the continuation token, if the page was full
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

// =============================================================================
// Write outcomes
// =============================================================================

/// Result of inserting a uniqueness-constrained record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written
    Created,
    /// An identical key already existed; nothing was written
    Duplicate,
}

// =============================================================================
// Store traits
// =============================================================================

/// User records keyed by internal id and external identity
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; `AlreadyExists` when the external id is taken
    async fn insert(&self, user: UserDoc) -> Result<UserDoc>;
    /// Look up by internal id; soft-deleted users resolve to None
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserDoc>>;
    /// Look up by external identity
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserDoc>>;
    /// Most recently created active users, for the suggestion pool
    async fn recent(&self, limit: i64) -> Result<Vec<UserDoc>>;
    /// Mark a user deleted, keeping the record; reads stop resolving them.
    /// False when the user is absent or already deleted.
    async fn soft_delete(&self, user_id: &str) -> Result<bool>;
}

/// Directed follow edges with pair uniqueness
#[async_trait]
pub trait FollowStore: Send + Sync {
    /// Insert an edge; `Duplicate` when the ordered pair already exists
    async fn insert(&self, follower_id: &str, following_id: &str) -> Result<InsertOutcome>;
    /// Delete an edge, returning whether it existed
    async fn delete(&self, follower_id: &str, following_id: &str) -> Result<bool>;
    /// Whether the edge exists
    async fn exists(&self, follower_id: &str, following_id: &str) -> Result<bool>;
    /// Edges pointing at a user, newest first
    async fn followers_of(
        &self,
        user_id: &str,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<FollowEdgeDoc>>;
    /// Edges out of a user, newest first
    async fn following_of(
        &self,
        user_id: &str,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<FollowEdgeDoc>>;
    /// Full count of followers
    async fn count_followers(&self, user_id: &str) -> Result<u64>;
    /// Full count of users followed
    async fn count_following(&self, user_id: &str) -> Result<u64>;
    /// Every id the user follows; full scan by design
    async fn following_ids(&self, user_id: &str) -> Result<Vec<String>>;
}

/// Directed block edges with pair uniqueness
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Insert an edge; `Duplicate` when the ordered pair already exists
    async fn insert(&self, blocker_id: &str, blocked_id: &str) -> Result<InsertOutcome>;
    /// Delete an edge, returning whether it existed
    async fn delete(&self, blocker_id: &str, blocked_id: &str) -> Result<bool>;
    /// Whether blocker has blocked blocked_id
    async fn exists(&self, blocker_id: &str, blocked_id: &str) -> Result<bool>;
    /// A user's outgoing blocks, newest first
    async fn blocked_of(
        &self,
        blocker_id: &str,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<BlockEdgeDoc>>;
    /// Ids of every party in a block with the user, either direction
    async fn involving(&self, user_id: &str) -> Result<Vec<String>>;
}

/// Notification records owned by their recipient
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a record, returning its id
    async fn insert(&self, notification: NotificationDoc) -> Result<String>;
    /// A recipient's records, newest first, optionally unread-only
    async fn page_for(
        &self,
        recipient_id: &str,
        only_unread: bool,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<NotificationDoc>>;
    /// Count of unread records
    async fn count_unread(&self, recipient_id: &str) -> Result<u64>;
    /// Flip one record to read; false when no record matched the owner
    async fn mark_read(&self, recipient_id: &str, notification_id: &str) -> Result<bool>;
    /// Flip every unread record in one bulk update, returning the number flipped
    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64>;
    /// Ownership-checked hard delete; false when no record matched
    async fn delete(&self, recipient_id: &str, notification_id: &str) -> Result<bool>;
    /// Delete up to `batch` records created before the cutoff, across all users
    async fn delete_created_before(&self, cutoff_ms: i64, batch: i64) -> Result<u64>;
}

/// Sliding-window entries; keys are not unique
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Record one accepted request for a key
    async fn record(&self, key: &str, timestamp_ms: i64) -> Result<()>;
    /// Count a key's entries with `timestamp >= since_ms`
    async fn count_since(&self, key: &str, since_ms: i64) -> Result<u64>;
    /// Timestamps of a key's entries with `timestamp >= since_ms`
    async fn timestamps_since(&self, key: &str, since_ms: i64) -> Result<Vec<i64>>;
    /// Delete up to `batch` of a key's entries strictly older than the cutoff
    async fn evict_key_before(&self, key: &str, cutoff_ms: i64, batch: i64) -> Result<u64>;
    /// Delete up to `batch` entries older than the cutoff across all keys
    async fn evict_all_before(&self, cutoff_ms: i64, batch: i64) -> Result<u64>;
}
