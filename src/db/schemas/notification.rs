//! Notification document schema
//!
//! One record per delivered notification, owned by the recipient. Records
//! are written once, flipped to read at most once, and removed either by the
//! recipient or by the retention sweep.
//!
//! Known per-kind extras ride in the schema-less `payload` document so new
//! notification kinds can add fields without a migration.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for notifications
pub const NOTIFICATION_COLLECTION: &str = "notifications";

/// What triggered the notification
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Follow,
    Reaction,
    Comment,
    Reply,
    Quote,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Reaction => "reaction",
            Self::Comment => "comment",
            Self::Reply => "reply",
            Self::Quote => "quote",
        }
    }
}

/// Kind of entity a notification points at
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Log,
    Thread,
    Reply,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Thread => "thread",
            Self::Reply => "reply",
        }
    }
}

/// Reference to an entity outside this subsystem, resolved at read time
/// through the content resolver.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: String,
}

impl TargetRef {
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Notification document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NotificationDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata; created_at is the delivery timestamp
    #[serde(default)]
    pub metadata: Metadata,

    /// Recipient and owner of the record
    pub recipient_id: String,

    /// User whose action produced the notification
    pub sender_id: String,

    /// What happened
    #[serde(default)]
    pub kind: NotificationKind,

    /// Entity the notification points at, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetRef>,

    /// Short free-text excerpt (comment body, reaction emoji, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Opaque per-kind extras, passed through unvalidated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Document>,

    /// Read-state flag; flipped once, never back
    #[serde(default)]
    pub is_read: bool,
}

impl NotificationDoc {
    /// Record id as a hex string, empty before insertion
    pub fn id(&self) -> String {
        self._id.map(|o| o.to_hex()).unwrap_or_default()
    }
}

impl IntoIndexes for NotificationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unread counts and unread-only listings
            (
                doc! { "recipient_id": 1, "is_read": 1 },
                Some(
                    IndexOptions::builder()
                        .name("recipient_read_index".to_string())
                        .build(),
                ),
            ),
            // Feed pages, newest first
            (
                doc! { "recipient_id": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("recipient_recent_index".to_string())
                        .build(),
                ),
            ),
            // Retention sweep scans
            (
                doc! { "metadata.created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("created_at_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for NotificationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&NotificationKind::Reaction).unwrap();
        assert_eq!(json, "\"reaction\"");

        let kind: NotificationKind = serde_json::from_str("\"quote\"").unwrap();
        assert_eq!(kind, NotificationKind::Quote);
        assert_eq!(kind.as_str(), "quote");
    }

    #[test]
    fn test_target_ref_roundtrip() {
        let target = TargetRef::new(TargetKind::Thread, "thread-42");
        let json = serde_json::to_string(&target).unwrap();
        let back: TargetRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, target);
        assert_eq!(back.kind.as_str(), "thread");
    }
}
