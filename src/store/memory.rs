//! In-memory store implementations
//!
//! DashMap-backed versions of the store traits for dev mode and the test
//! suite. Ids are freshly generated ObjectIds so values round-trip through
//! the same document types as the MongoDB implementations, and pair
//! uniqueness is enforced by an atomic map-entry insert to mirror the
//! unique-index semantics.

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::db::schemas::{BlockEdgeDoc, FollowEdgeDoc, Metadata, NotificationDoc, UserDoc};
use crate::store::{
    BlockStore, Cursor, FollowStore, InsertOutcome, NotificationStore, RateStore, UserStore,
};
use crate::types::{GrapevineError, Result};

/// True when `(ts_ms, id)` sorts strictly after the cursor position in the
/// newest-first order.
fn after_cursor(ts_ms: i64, id: &str, cursor: &Cursor) -> bool {
    ts_ms < cursor.ts_ms || (ts_ms == cursor.ts_ms && id < cursor.id.as_str())
}

/// Newest-first comparator over `(ts_ms, id)` pairs
fn newest_first(a: &(i64, String), b: &(i64, String)) -> std::cmp::Ordering {
    b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1))
}

// =============================================================================
// Users
// =============================================================================

/// In-memory user store
#[derive(Default)]
pub struct MemoryUserStore {
    /// id -> user
    users: DashMap<String, UserDoc>,
    /// external_id -> id, the uniqueness point for registration
    by_external: DashMap<String, String>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, mut user: UserDoc) -> Result<UserDoc> {
        user._id = Some(ObjectId::new());
        user.metadata = Metadata::new();
        let id = user.id();

        match self.by_external.entry(user.external_id.clone()) {
            Entry::Occupied(_) => Err(GrapevineError::AlreadyExists(format!(
                "user with external id {} already exists",
                user.external_id
            ))),
            Entry::Vacant(slot) => {
                self.users.insert(id.clone(), user.clone());
                slot.insert(id);
                Ok(user)
            }
        }
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserDoc>> {
        Ok(self
            .users
            .get(user_id)
            .filter(|u| !u.metadata.is_deleted)
            .map(|u| u.clone()))
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserDoc>> {
        let id = match self.by_external.get(external_id) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };
        self.find_by_id(&id).await
    }

    async fn recent(&self, limit: i64) -> Result<Vec<UserDoc>> {
        let mut users: Vec<UserDoc> = self
            .users
            .iter()
            .filter(|u| u.is_active && !u.metadata.is_deleted)
            .map(|u| u.clone())
            .collect();

        users.sort_by(|a, b| {
            newest_first(
                &(a.metadata.created_at_ms(), a.id()),
                &(b.metadata.created_at_ms(), b.id()),
            )
        });
        users.truncate(limit.max(0) as usize);
        Ok(users)
    }

    async fn soft_delete(&self, user_id: &str) -> Result<bool> {
        match self.users.get_mut(user_id) {
            Some(mut entry) if !entry.metadata.is_deleted => {
                entry.metadata.is_deleted = true;
                entry.metadata.deleted_at = Some(DateTime::now());
                entry.metadata.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// =============================================================================
// Follow edges
// =============================================================================

/// In-memory follow store keyed by the ordered pair
#[derive(Default)]
pub struct MemoryFollowStore {
    edges: DashMap<(String, String), FollowEdgeDoc>,
}

impl MemoryFollowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn page(
        &self,
        edges: Vec<FollowEdgeDoc>,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Vec<FollowEdgeDoc> {
        let mut keyed: Vec<(i64, String, FollowEdgeDoc)> = edges
            .into_iter()
            .map(|e| (e.metadata.created_at_ms(), e.id(), e))
            .collect();
        keyed.sort_by(|a, b| newest_first(&(a.0, a.1.clone()), &(b.0, b.1.clone())));

        keyed
            .into_iter()
            .filter(|(ts, id, _)| cursor.map(|c| after_cursor(*ts, id, c)).unwrap_or(true))
            .take(limit.max(0) as usize)
            .map(|(_, _, e)| e)
            .collect()
    }
}

#[async_trait]
impl FollowStore for MemoryFollowStore {
    async fn insert(&self, follower_id: &str, following_id: &str) -> Result<InsertOutcome> {
        let key = (follower_id.to_string(), following_id.to_string());
        match self.edges.entry(key) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                let mut edge =
                    FollowEdgeDoc::new(follower_id.to_string(), following_id.to_string());
                edge._id = Some(ObjectId::new());
                slot.insert(edge);
                Ok(InsertOutcome::Created)
            }
        }
    }

    async fn delete(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        let key = (follower_id.to_string(), following_id.to_string());
        Ok(self.edges.remove(&key).is_some())
    }

    async fn exists(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        let key = (follower_id.to_string(), following_id.to_string());
        Ok(self.edges.contains_key(&key))
    }

    async fn followers_of(
        &self,
        user_id: &str,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<FollowEdgeDoc>> {
        let edges: Vec<FollowEdgeDoc> = self
            .edges
            .iter()
            .filter(|e| e.following_id == user_id)
            .map(|e| e.clone())
            .collect();
        Ok(self.page(edges, limit, cursor))
    }

    async fn following_of(
        &self,
        user_id: &str,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<FollowEdgeDoc>> {
        let edges: Vec<FollowEdgeDoc> = self
            .edges
            .iter()
            .filter(|e| e.follower_id == user_id)
            .map(|e| e.clone())
            .collect();
        Ok(self.page(edges, limit, cursor))
    }

    async fn count_followers(&self, user_id: &str) -> Result<u64> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.following_id == user_id)
            .count() as u64)
    }

    async fn count_following(&self, user_id: &str) -> Result<u64> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.follower_id == user_id)
            .count() as u64)
    }

    async fn following_ids(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.follower_id == user_id)
            .map(|e| e.following_id.clone())
            .collect())
    }
}

// =============================================================================
// Block edges
// =============================================================================

/// In-memory block store keyed by the ordered pair
#[derive(Default)]
pub struct MemoryBlockStore {
    edges: DashMap<(String, String), BlockEdgeDoc>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn insert(&self, blocker_id: &str, blocked_id: &str) -> Result<InsertOutcome> {
        let key = (blocker_id.to_string(), blocked_id.to_string());
        match self.edges.entry(key) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                let mut edge = BlockEdgeDoc::new(blocker_id.to_string(), blocked_id.to_string());
                edge._id = Some(ObjectId::new());
                slot.insert(edge);
                Ok(InsertOutcome::Created)
            }
        }
    }

    async fn delete(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        let key = (blocker_id.to_string(), blocked_id.to_string());
        Ok(self.edges.remove(&key).is_some())
    }

    async fn exists(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        let key = (blocker_id.to_string(), blocked_id.to_string());
        Ok(self.edges.contains_key(&key))
    }

    async fn blocked_of(
        &self,
        blocker_id: &str,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<BlockEdgeDoc>> {
        let mut keyed: Vec<(i64, String, BlockEdgeDoc)> = self
            .edges
            .iter()
            .filter(|e| e.blocker_id == blocker_id)
            .map(|e| (e.metadata.created_at_ms(), e.id(), e.clone()))
            .collect();
        keyed.sort_by(|a, b| newest_first(&(a.0, a.1.clone()), &(b.0, b.1.clone())));

        Ok(keyed
            .into_iter()
            .filter(|(ts, id, _)| cursor.map(|c| after_cursor(*ts, id, c)).unwrap_or(true))
            .take(limit.max(0) as usize)
            .map(|(_, _, e)| e)
            .collect())
    }

    async fn involving(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .edges
            .iter()
            .filter_map(|e| {
                if e.blocker_id == user_id {
                    Some(e.blocked_id.clone())
                } else if e.blocked_id == user_id {
                    Some(e.blocker_id.clone())
                } else {
                    None
                }
            })
            .collect())
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// In-memory notification store
#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: DashMap<String, NotificationDoc>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, mut notification: NotificationDoc) -> Result<String> {
        notification._id = Some(ObjectId::new());
        notification.metadata = Metadata::new();
        let id = notification.id();
        self.notifications.insert(id.clone(), notification);
        Ok(id)
    }

    async fn page_for(
        &self,
        recipient_id: &str,
        only_unread: bool,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<NotificationDoc>> {
        let mut keyed: Vec<(i64, String, NotificationDoc)> = self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && (!only_unread || !n.is_read))
            .map(|n| (n.metadata.created_at_ms(), n.id(), n.clone()))
            .collect();
        keyed.sort_by(|a, b| newest_first(&(a.0, a.1.clone()), &(b.0, b.1.clone())));

        Ok(keyed
            .into_iter()
            .filter(|(ts, id, _)| cursor.map(|c| after_cursor(*ts, id, c)).unwrap_or(true))
            .take(limit.max(0) as usize)
            .map(|(_, _, n)| n)
            .collect())
    }

    async fn count_unread(&self, recipient_id: &str) -> Result<u64> {
        Ok(self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count() as u64)
    }

    async fn mark_read(&self, recipient_id: &str, notification_id: &str) -> Result<bool> {
        match self.notifications.get_mut(notification_id) {
            Some(mut entry) if entry.recipient_id == recipient_id => {
                entry.is_read = true;
                entry.metadata.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64> {
        let mut flipped = 0u64;
        for mut entry in self.notifications.iter_mut() {
            if entry.recipient_id == recipient_id && !entry.is_read {
                entry.is_read = true;
                entry.metadata.touch();
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn delete(&self, recipient_id: &str, notification_id: &str) -> Result<bool> {
        Ok(self
            .notifications
            .remove_if(notification_id, |_, n| n.recipient_id == recipient_id)
            .is_some())
    }

    async fn delete_created_before(&self, cutoff_ms: i64, batch: i64) -> Result<u64> {
        let expired: Vec<String> = self
            .notifications
            .iter()
            .filter(|n| n.metadata.created_at_ms() < cutoff_ms)
            .map(|n| n.key().clone())
            .take(batch.max(0) as usize)
            .collect();

        let mut removed = 0u64;
        for id in expired {
            if self.notifications.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// =============================================================================
// Rate entries
// =============================================================================

/// In-memory rate store: key -> accepted-request timestamps
#[derive(Default)]
pub struct MemoryRateStore {
    entries: DashMap<String, Vec<i64>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn record(&self, key: &str, timestamp_ms: i64) -> Result<()> {
        self.entries
            .entry(key.to_string())
            .or_default()
            .push(timestamp_ms);
        Ok(())
    }

    async fn count_since(&self, key: &str, since_ms: i64) -> Result<u64> {
        Ok(self
            .entries
            .get(key)
            .map(|v| v.iter().filter(|ts| **ts >= since_ms).count() as u64)
            .unwrap_or(0))
    }

    async fn timestamps_since(&self, key: &str, since_ms: i64) -> Result<Vec<i64>> {
        Ok(self
            .entries
            .get(key)
            .map(|v| v.iter().copied().filter(|ts| *ts >= since_ms).collect())
            .unwrap_or_default())
    }

    async fn evict_key_before(&self, key: &str, cutoff_ms: i64, batch: i64) -> Result<u64> {
        let budget = batch.max(0) as u64;
        let mut removed = 0u64;
        if let Some(mut entries) = self.entries.get_mut(key) {
            entries.retain(|ts| {
                if *ts < cutoff_ms && removed < budget {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        Ok(removed)
    }

    async fn evict_all_before(&self, cutoff_ms: i64, batch: i64) -> Result<u64> {
        let budget = batch.max(0) as u64;
        let mut removed = 0u64;
        for mut entry in self.entries.iter_mut() {
            if removed >= budget {
                break;
            }
            entry.value_mut().retain(|ts| {
                if *ts < cutoff_ms && removed < budget {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        // Drop keys whose windows have fully drained
        self.entries.retain(|_, v| !v.is_empty());
        Ok(removed)
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// Every in-memory store, wired together for dev mode and tests
#[derive(Default)]
pub struct MemoryStores {
    pub users: Arc<MemoryUserStore>,
    pub follows: Arc<MemoryFollowStore>,
    pub blocks: Arc<MemoryBlockStore>,
    pub notifications: Arc<MemoryNotificationStore>,
    pub rates: Arc<MemoryRateStore>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_follow_pair_insert_is_unique() {
        let store = MemoryFollowStore::new();
        assert_eq!(store.insert("a", "b").await.unwrap(), InsertOutcome::Created);
        assert_eq!(
            store.insert("a", "b").await.unwrap(),
            InsertOutcome::Duplicate
        );
        // Reverse direction is a distinct edge
        assert_eq!(store.insert("b", "a").await.unwrap(), InsertOutcome::Created);
        assert_eq!(store.count_followers("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_user_external_id_is_unique() {
        let store = MemoryUserStore::new();
        let first = store
            .insert(UserDoc::new("ext-1".into(), "one".into(), "One".into()))
            .await
            .unwrap();
        assert!(!first.id().is_empty());

        let err = store
            .insert(UserDoc::new("ext-1".into(), "two".into(), "Two".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, GrapevineError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_user_soft_delete_stops_reads() {
        let store = MemoryUserStore::new();
        let user = store
            .insert(UserDoc::new("ext-9".into(), "nine".into(), "Nine".into()))
            .await
            .unwrap();
        let id = user.id();

        assert!(store.soft_delete(&id).await.unwrap());
        assert!(store.find_by_id(&id).await.unwrap().is_none());
        assert!(store.find_by_external_id("ext-9").await.unwrap().is_none());
        // Repeat delete is a no-op
        assert!(!store.soft_delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_notification_delete_checks_owner() {
        let store = MemoryNotificationStore::new();
        let mut doc = NotificationDoc::default();
        doc.recipient_id = "u1".into();
        doc.sender_id = "u2".into();
        let id = store.insert(doc).await.unwrap();

        assert!(!store.delete("someone-else", &id).await.unwrap());
        assert!(store.delete("u1", &id).await.unwrap());
        assert!(!store.delete("u1", &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rate_eviction_respects_batch_size() {
        let store = MemoryRateStore::new();
        for ts in 0..10 {
            store.record("k", ts).await.unwrap();
        }

        assert_eq!(store.evict_key_before("k", 100, 4).await.unwrap(), 4);
        assert_eq!(store.count_since("k", 0).await.unwrap(), 6);
        assert_eq!(store.evict_key_before("k", 100, 100).await.unwrap(), 6);
        assert_eq!(store.count_since("k", 0).await.unwrap(), 0);
    }
}
