//! Notification creation, feeds, read-state, and retention

use bson::Document;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::content::ContentResolver;
use crate::db::schemas::{
    NotificationDoc, NotificationKind, TargetKind, TargetRef, UserProfile,
};
use crate::identity::{require_caller, IdentityResolver};
use crate::store::{BlockStore, Cursor, NotificationStore, Page, UserStore, MAX_PAGE_SIZE};
use crate::types::{GrapevineError, Result};

/// Default number of records removed per retention batch
const DEFAULT_SWEEP_BATCH: i64 = 500;

/// A notification about to be created.
///
/// Built by the acting side (follow handler, reaction handler, ...) with
/// internal user ids; the engine decides whether a record is written at all.
#[derive(Debug, Clone)]
pub struct NewNotification {
    recipient_id: String,
    sender_id: String,
    kind: NotificationKind,
    target: Option<TargetRef>,
    content: Option<String>,
    payload: Option<Document>,
}

impl NewNotification {
    pub fn new(
        recipient_id: impl Into<String>,
        sender_id: impl Into<String>,
        kind: NotificationKind,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            sender_id: sender_id.into(),
            kind,
            target: None,
            content: None,
            payload: None,
        }
    }

    /// Point the notification at a catalog entity
    pub fn with_target(mut self, kind: TargetKind, id: impl Into<String>) -> Self {
        self.target = Some(TargetRef::new(kind, id));
        self
    }

    /// Attach a short excerpt (comment body, reaction emoji, ...)
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Attach opaque per-kind extras
    pub fn with_payload(mut self, payload: Document) -> Self {
        self.payload = Some(payload);
        self
    }

    fn into_doc(self) -> NotificationDoc {
        NotificationDoc {
            _id: None,
            metadata: Default::default(),
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            kind: self.kind,
            target: self.target,
            content: self.content,
            payload: self.payload,
            is_read: false,
        }
    }
}

/// Notification target as surfaced in feeds
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    pub kind: TargetKind,
    pub id: String,
    /// Resolved entity, absent when the catalog no longer knows the id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<serde_json::Value>,
}

/// One feed entry: the stored record enriched with sender and target
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    pub kind: NotificationKind,
    pub sender: UserProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Document>,
    pub is_read: bool,
    pub created_at_ms: i64,
}

/// Notification engine over pluggable stores and resolvers
pub struct NotificationEngine {
    notifications: Arc<dyn NotificationStore>,
    blocks: Arc<dyn BlockStore>,
    users: Arc<dyn UserStore>,
    identity: Arc<dyn IdentityResolver>,
    content: Arc<dyn ContentResolver>,
    sweep_batch: i64,
}

impl NotificationEngine {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        blocks: Arc<dyn BlockStore>,
        users: Arc<dyn UserStore>,
        identity: Arc<dyn IdentityResolver>,
        content: Arc<dyn ContentResolver>,
    ) -> Self {
        Self {
            notifications,
            blocks,
            users,
            identity,
            content,
            sweep_batch: DEFAULT_SWEEP_BATCH,
        }
    }

    pub fn with_sweep_batch(mut self, batch: i64) -> Self {
        self.sweep_batch = batch.max(1);
        self
    }

    /// Write a notification record unless suppression applies.
    ///
    /// Self-notifications and notifications from senders the recipient has
    /// blocked are silently skipped; suppression happens at write time so a
    /// blocked sender never produces a record. Returns the record id when
    /// one was written.
    pub async fn create(&self, new: NewNotification) -> Result<Option<String>> {
        if new.recipient_id == new.sender_id {
            debug!("Skipping self-notification for {}", new.recipient_id);
            return Ok(None);
        }

        if self.blocks.exists(&new.recipient_id, &new.sender_id).await? {
            debug!(
                "Suppressing {} notification from {} to {}: sender is blocked",
                new.kind.as_str(),
                new.sender_id,
                new.recipient_id
            );
            return Ok(None);
        }

        let id = self.notifications.insert(new.into_doc()).await?;
        Ok(Some(id))
    }

    /// Most-recent-first feed page for the caller.
    ///
    /// Records whose sender no longer resolves are dropped from the page;
    /// a target that fails to resolve keeps its record with the entity
    /// absent. The continuation cursor always advances over the raw page,
    /// dropped records included, so pagination cannot stall.
    pub async fn list(
        &self,
        caller: Option<&str>,
        limit: i64,
        only_unread: bool,
        cursor: Option<&str>,
    ) -> Result<Page<NotificationView>> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let cursor = Cursor::decode_opt(cursor)?;

        let records = self
            .notifications
            .page_for(&caller.id(), only_unread, limit, cursor.as_ref())
            .await?;

        let next_cursor = if (records.len() as i64) < limit {
            None
        } else {
            records
                .last()
                .map(|n| Cursor::new(n.metadata.created_at_ms(), n.id()).encode())
        };

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            if let Some(view) = self.enrich(record).await? {
                items.push(view);
            }
        }

        Ok(Page { items, next_cursor })
    }

    /// Number of unread records owned by the caller
    pub async fn unread_count(&self, caller: Option<&str>) -> Result<u64> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;
        self.notifications.count_unread(&caller.id()).await
    }

    /// Flip one owned record to read; idempotent for already-read records
    pub async fn mark_read(&self, caller: Option<&str>, notification_id: &str) -> Result<()> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;

        if self
            .notifications
            .mark_read(&caller.id(), notification_id)
            .await?
        {
            Ok(())
        } else {
            Err(GrapevineError::NotFound(format!(
                "notification {} not found",
                notification_id
            )))
        }
    }

    /// Flip every unread record in one bulk store update.
    ///
    /// Concurrent `unread_count` readers may observe the count mid-drop; the
    /// final state is always fully read. Returns the number flipped.
    pub async fn mark_all_read(&self, caller: Option<&str>) -> Result<u64> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;
        self.notifications.mark_all_read(&caller.id()).await
    }

    /// Remove one owned record
    pub async fn delete(&self, caller: Option<&str>, notification_id: &str) -> Result<()> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;

        if self
            .notifications
            .delete(&caller.id(), notification_id)
            .await?
        {
            Ok(())
        } else {
            Err(GrapevineError::NotFound(format!(
                "notification {} not found",
                notification_id
            )))
        }
    }

    /// Remove records older than the retention horizon, across all users.
    ///
    /// Returns the number removed. Store failures end the sweep early with a
    /// warning; the next scheduled run picks up the remainder.
    pub async fn cleanup_old(&self, retention_days: u32) -> u64 {
        let cutoff_ms =
            chrono::Utc::now().timestamp_millis() - i64::from(retention_days) * 86_400_000;
        self.cleanup_before(cutoff_ms).await
    }

    /// Time-parameterized form of [`cleanup_old`](Self::cleanup_old)
    pub async fn cleanup_before(&self, cutoff_ms: i64) -> u64 {
        let mut removed = 0u64;
        loop {
            match self
                .notifications
                .delete_created_before(cutoff_ms, self.sweep_batch)
                .await
            {
                Ok(batch_removed) => {
                    removed += batch_removed;
                    if batch_removed < self.sweep_batch as u64 {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Notification retention sweep stopped early: {}", e);
                    break;
                }
            }
        }

        if removed > 0 {
            info!("Retention sweep removed {} notifications", removed);
        }
        removed
    }

    async fn enrich(&self, record: NotificationDoc) -> Result<Option<NotificationView>> {
        let sender = match self.users.find_by_id(&record.sender_id).await? {
            Some(user) => user,
            None => {
                debug!(
                    "Dropping notification {}: sender {} no longer resolves",
                    record.id(),
                    record.sender_id
                );
                return Ok(None);
            }
        };

        let target = match record.target.as_ref() {
            Some(target_ref) => {
                let entity = match self.content.resolve(target_ref.kind, &target_ref.id).await {
                    Ok(entity) => entity,
                    Err(e) => {
                        warn!(
                            "Failed to resolve target {}:{}: {}",
                            target_ref.kind.as_str(),
                            target_ref.id,
                            e
                        );
                        None
                    }
                };
                Some(TargetView {
                    kind: target_ref.kind,
                    id: target_ref.id.clone(),
                    entity,
                })
            }
            None => None,
        };

        Ok(Some(NotificationView {
            id: record.id(),
            kind: record.kind,
            sender: sender.profile(),
            target,
            created_at_ms: record.metadata.created_at_ms(),
            is_read: record.is_read,
            content: record.content,
            payload: record.payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_builder_maps_every_field() {
        let doc = NewNotification::new("u1", "u2", NotificationKind::Comment)
            .with_target(TargetKind::Thread, "thread-9")
            .with_content("great pick")
            .with_payload(doc! { "thread_title": "favorite scores" })
            .into_doc();

        assert_eq!(doc.recipient_id, "u1");
        assert_eq!(doc.sender_id, "u2");
        assert_eq!(doc.kind, NotificationKind::Comment);
        assert_eq!(doc.target, Some(TargetRef::new(TargetKind::Thread, "thread-9")));
        assert_eq!(doc.content.as_deref(), Some("great pick"));
        assert!(!doc.is_read);
    }

    #[test]
    fn test_builder_defaults_are_bare() {
        let doc = NewNotification::new("u1", "u2", NotificationKind::Follow).into_doc();
        assert!(doc.target.is_none());
        assert!(doc.content.is_none());
        assert!(doc.payload.is_none());
    }
}
