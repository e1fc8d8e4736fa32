//! MongoDB store implementations
//!
//! One thin service per collection, built on the typed collection wrapper.
//! Uniqueness comes from the schema-declared unique indexes; duplicate-key
//! failures surface as [`InsertOutcome::Duplicate`] rather than errors.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, DateTime, Document};
use futures::stream::StreamExt;
use mongodb::options::FindOptions;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::db::schemas::{
    BlockEdgeDoc, FollowEdgeDoc, NotificationDoc, RateEntryDoc, UserDoc, BLOCK_COLLECTION,
    FOLLOW_COLLECTION, NOTIFICATION_COLLECTION, RATE_ENTRY_COLLECTION, USER_COLLECTION,
};
use crate::db::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
use crate::store::{
    BlockStore, Cursor, FollowStore, InsertOutcome, NotificationStore, RateStore, UserStore,
};
use crate::types::{GrapevineError, Result};

/// Newest-first sort used by every listing
fn recent_sort() -> Document {
    doc! { "metadata.created_at": -1, "_id": -1 }
}

/// Add the keyset condition for a cursor position to a filter
fn apply_cursor(filter: &mut Document, cursor: Option<&Cursor>) -> Result<()> {
    if let Some(c) = cursor {
        let oid = ObjectId::parse_str(&c.id)
            .map_err(|_| GrapevineError::BadRequest("malformed cursor".to_string()))?;
        let ts = DateTime::from_millis(c.ts_ms);
        filter.insert(
            "$or",
            vec![
                doc! { "metadata.created_at": { "$lt": ts } },
                doc! { "metadata.created_at": ts, "_id": { "$lt": oid } },
            ],
        );
    }
    Ok(())
}

/// Collect a sorted, limited query from the raw collection
async fn find_with_options<T>(
    collection: &MongoCollection<T>,
    filter: Document,
    options: FindOptions,
) -> Result<Vec<T>>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    let mut stream = collection
        .inner()
        .find(filter)
        .with_options(options)
        .await
        .map_err(|e| GrapevineError::Database(format!("Find failed: {}", e)))?;

    let mut items = Vec::new();
    while let Some(result) = stream.next().await {
        match result {
            Ok(item) => items.push(item),
            Err(e) => warn!("Error reading document: {}", e),
        }
    }
    Ok(items)
}

/// Delete up to `batch` documents matching the filter.
///
/// MongoDB's delete_many has no limit clause, so the batch bound comes from
/// collecting at most `batch` ids first and deleting by `$in`.
async fn batched_delete<T, F>(
    collection: &MongoCollection<T>,
    filter: Document,
    batch: i64,
    id_of: F,
) -> Result<u64>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    F: Fn(&T) -> Option<ObjectId>,
{
    let options = FindOptions::builder().limit(batch.max(0)).build();
    let candidates = find_with_options(collection, filter, options).await?;

    let ids: Vec<ObjectId> = candidates.iter().filter_map(&id_of).collect();
    if ids.is_empty() {
        return Ok(0);
    }

    collection.delete_many(doc! { "_id": { "$in": ids } }).await
}

// =============================================================================
// Users
// =============================================================================

/// MongoDB-backed user store
pub struct MongoUserStore {
    collection: MongoCollection<UserDoc>,
}

impl MongoUserStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn insert(&self, user: UserDoc) -> Result<UserDoc> {
        let external_id = user.external_id.clone();
        let id = self.collection.insert_one(user).await.map_err(|e| match e {
            GrapevineError::AlreadyExists(_) => GrapevineError::AlreadyExists(format!(
                "user with external id {} already exists",
                external_id
            )),
            other => other,
        })?;

        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| GrapevineError::Database("inserted user not found".to_string()))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserDoc>> {
        let oid = match ObjectId::parse_str(user_id) {
            Ok(o) => o,
            Err(_) => return Ok(None),
        };
        self.collection.find_one(doc! { "_id": oid }).await
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserDoc>> {
        self.collection
            .find_one(doc! { "external_id": external_id })
            .await
    }

    async fn recent(&self, limit: i64) -> Result<Vec<UserDoc>> {
        let filter = doc! {
            "is_active": true,
            "metadata.is_deleted": { "$ne": true },
        };
        let options = FindOptions::builder()
            .sort(recent_sort())
            .limit(limit.max(0))
            .build();
        find_with_options(&self.collection, filter, options).await
    }

    async fn soft_delete(&self, user_id: &str) -> Result<bool> {
        let oid = match ObjectId::parse_str(user_id) {
            Ok(o) => o,
            Err(_) => return Ok(false),
        };

        let result = self
            .collection
            .soft_delete(doc! { "_id": oid, "metadata.is_deleted": { "$ne": true } })
            .await?;
        Ok(result.modified_count > 0)
    }
}

// =============================================================================
// Follow edges
// =============================================================================

/// MongoDB-backed follow store
pub struct MongoFollowStore {
    collection: MongoCollection<FollowEdgeDoc>,
}

impl MongoFollowStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo.collection::<FollowEdgeDoc>(FOLLOW_COLLECTION).await?;
        Ok(Self { collection })
    }

    async fn edges_page(
        &self,
        mut filter: Document,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<FollowEdgeDoc>> {
        apply_cursor(&mut filter, cursor)?;
        let options = FindOptions::builder()
            .sort(recent_sort())
            .limit(limit.max(0))
            .build();
        find_with_options(&self.collection, filter, options).await
    }
}

#[async_trait]
impl FollowStore for MongoFollowStore {
    async fn insert(&self, follower_id: &str, following_id: &str) -> Result<InsertOutcome> {
        let edge = FollowEdgeDoc::new(follower_id.to_string(), following_id.to_string());
        match self.collection.insert_one(edge).await {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(GrapevineError::AlreadyExists(_)) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        self.collection
            .delete_one(doc! { "follower_id": follower_id, "following_id": following_id })
            .await
    }

    async fn exists(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        Ok(self
            .collection
            .find_one(doc! { "follower_id": follower_id, "following_id": following_id })
            .await?
            .is_some())
    }

    async fn followers_of(
        &self,
        user_id: &str,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<FollowEdgeDoc>> {
        self.edges_page(doc! { "following_id": user_id }, limit, cursor)
            .await
    }

    async fn following_of(
        &self,
        user_id: &str,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<FollowEdgeDoc>> {
        self.edges_page(doc! { "follower_id": user_id }, limit, cursor)
            .await
    }

    async fn count_followers(&self, user_id: &str) -> Result<u64> {
        self.collection.count(doc! { "following_id": user_id }).await
    }

    async fn count_following(&self, user_id: &str) -> Result<u64> {
        self.collection.count(doc! { "follower_id": user_id }).await
    }

    async fn following_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let edges = self
            .collection
            .find_many(doc! { "follower_id": user_id })
            .await?;
        Ok(edges.into_iter().map(|e| e.following_id).collect())
    }
}

// =============================================================================
// Block edges
// =============================================================================

/// MongoDB-backed block store
pub struct MongoBlockStore {
    collection: MongoCollection<BlockEdgeDoc>,
}

impl MongoBlockStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo.collection::<BlockEdgeDoc>(BLOCK_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl BlockStore for MongoBlockStore {
    async fn insert(&self, blocker_id: &str, blocked_id: &str) -> Result<InsertOutcome> {
        let edge = BlockEdgeDoc::new(blocker_id.to_string(), blocked_id.to_string());
        match self.collection.insert_one(edge).await {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(GrapevineError::AlreadyExists(_)) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        self.collection
            .delete_one(doc! { "blocker_id": blocker_id, "blocked_id": blocked_id })
            .await
    }

    async fn exists(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        Ok(self
            .collection
            .find_one(doc! { "blocker_id": blocker_id, "blocked_id": blocked_id })
            .await?
            .is_some())
    }

    async fn blocked_of(
        &self,
        blocker_id: &str,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<BlockEdgeDoc>> {
        let mut filter = doc! { "blocker_id": blocker_id };
        apply_cursor(&mut filter, cursor)?;
        let options = FindOptions::builder()
            .sort(recent_sort())
            .limit(limit.max(0))
            .build();
        find_with_options(&self.collection, filter, options).await
    }

    async fn involving(&self, user_id: &str) -> Result<Vec<String>> {
        let edges = self
            .collection
            .find_many(doc! {
                "$or": [ { "blocker_id": user_id }, { "blocked_id": user_id } ]
            })
            .await?;

        Ok(edges
            .into_iter()
            .map(|e| {
                if e.blocker_id == user_id {
                    e.blocked_id
                } else {
                    e.blocker_id
                }
            })
            .collect())
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// MongoDB-backed notification store
pub struct MongoNotificationStore {
    collection: MongoCollection<NotificationDoc>,
}

impl MongoNotificationStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo
            .collection::<NotificationDoc>(NOTIFICATION_COLLECTION)
            .await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl NotificationStore for MongoNotificationStore {
    async fn insert(&self, notification: NotificationDoc) -> Result<String> {
        let id = self.collection.insert_one(notification).await?;
        Ok(id.to_hex())
    }

    async fn page_for(
        &self,
        recipient_id: &str,
        only_unread: bool,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<NotificationDoc>> {
        let mut filter = doc! { "recipient_id": recipient_id };
        if only_unread {
            filter.insert("is_read", false);
        }
        apply_cursor(&mut filter, cursor)?;

        let options = FindOptions::builder()
            .sort(recent_sort())
            .limit(limit.max(0))
            .build();
        find_with_options(&self.collection, filter, options).await
    }

    async fn count_unread(&self, recipient_id: &str) -> Result<u64> {
        self.collection
            .count(doc! { "recipient_id": recipient_id, "is_read": false })
            .await
    }

    async fn mark_read(&self, recipient_id: &str, notification_id: &str) -> Result<bool> {
        let oid = match ObjectId::parse_str(notification_id) {
            Ok(o) => o,
            Err(_) => return Ok(false),
        };

        let result = self
            .collection
            .update_one(
                doc! { "_id": oid, "recipient_id": recipient_id },
                doc! {
                    "$set": {
                        "is_read": true,
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .await?;

        // matched, not modified: re-marking an already-read record succeeds
        Ok(result.matched_count > 0)
    }

    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64> {
        let result = self
            .collection
            .inner()
            .update_many(
                doc! { "recipient_id": recipient_id, "is_read": false },
                doc! {
                    "$set": {
                        "is_read": true,
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .await
            .map_err(|e| GrapevineError::Database(format!("Update failed: {}", e)))?;

        Ok(result.modified_count)
    }

    async fn delete(&self, recipient_id: &str, notification_id: &str) -> Result<bool> {
        let oid = match ObjectId::parse_str(notification_id) {
            Ok(o) => o,
            Err(_) => return Ok(false),
        };
        self.collection
            .delete_one(doc! { "_id": oid, "recipient_id": recipient_id })
            .await
    }

    async fn delete_created_before(&self, cutoff_ms: i64, batch: i64) -> Result<u64> {
        let filter = doc! {
            "metadata.created_at": { "$lt": DateTime::from_millis(cutoff_ms) }
        };
        batched_delete(&self.collection, filter, batch, |n: &NotificationDoc| n._id).await
    }
}

// =============================================================================
// Rate entries
// =============================================================================

/// MongoDB-backed rate store
pub struct MongoRateStore {
    collection: MongoCollection<RateEntryDoc>,
}

impl MongoRateStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo
            .collection::<RateEntryDoc>(RATE_ENTRY_COLLECTION)
            .await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl RateStore for MongoRateStore {
    async fn record(&self, key: &str, timestamp_ms: i64) -> Result<()> {
        self.collection
            .insert_one(RateEntryDoc::new(key.to_string(), timestamp_ms))
            .await?;
        Ok(())
    }

    async fn count_since(&self, key: &str, since_ms: i64) -> Result<u64> {
        self.collection
            .count(doc! {
                "key": key,
                "timestamp": { "$gte": DateTime::from_millis(since_ms) },
            })
            .await
    }

    async fn timestamps_since(&self, key: &str, since_ms: i64) -> Result<Vec<i64>> {
        let entries = self
            .collection
            .find_many(doc! {
                "key": key,
                "timestamp": { "$gte": DateTime::from_millis(since_ms) },
            })
            .await?;

        Ok(entries
            .into_iter()
            .map(|e| e.timestamp.timestamp_millis())
            .collect())
    }

    async fn evict_key_before(&self, key: &str, cutoff_ms: i64, batch: i64) -> Result<u64> {
        let filter = doc! {
            "key": key,
            "timestamp": { "$lt": DateTime::from_millis(cutoff_ms) },
        };
        batched_delete(&self.collection, filter, batch, |e: &RateEntryDoc| e._id).await
    }

    async fn evict_all_before(&self, cutoff_ms: i64, batch: i64) -> Result<u64> {
        let filter = doc! {
            "timestamp": { "$lt": DateTime::from_millis(cutoff_ms) },
        };
        batched_delete(&self.collection, filter, batch, |e: &RateEntryDoc| e._id).await
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// Every MongoDB store, wired against one client
pub struct MongoStores {
    pub users: Arc<MongoUserStore>,
    pub follows: Arc<MongoFollowStore>,
    pub blocks: Arc<MongoBlockStore>,
    pub notifications: Arc<MongoNotificationStore>,
    pub rates: Arc<MongoRateStore>,
}

impl MongoStores {
    /// Open every collection and apply schema indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            users: Arc::new(MongoUserStore::new(mongo).await?),
            follows: Arc::new(MongoFollowStore::new(mongo).await?),
            blocks: Arc::new(MongoBlockStore::new(mongo).await?),
            notifications: Arc::new(MongoNotificationStore::new(mongo).await?),
            rates: Arc::new(MongoRateStore::new(mongo).await?),
        })
    }
}
