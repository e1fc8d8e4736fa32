//! Follow edge schema
//!
//! Directed follower -> following edge. The compound unique index is the
//! serialization point for concurrent follows of the same pair: the second
//! insert fails with a duplicate-key error instead of creating a twin edge.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for follow edges
pub const FOLLOW_COLLECTION: &str = "follows";

/// Follow edge document. Immutable once created; unfollow deletes it.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FollowEdgeDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata; created_at doubles as the follow timestamp
    #[serde(default)]
    pub metadata: Metadata,

    /// User who follows
    pub follower_id: String,

    /// User being followed
    pub following_id: String,
}

impl FollowEdgeDoc {
    pub fn new(follower_id: String, following_id: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            follower_id,
            following_id,
        }
    }

    /// Edge id as a hex string, empty before insertion
    pub fn id(&self) -> String {
        self._id.map(|o| o.to_hex()).unwrap_or_default()
    }
}

impl IntoIndexes for FollowEdgeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One edge per ordered pair
            (
                doc! { "follower_id": 1, "following_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("follower_following_unique".to_string())
                        .build(),
                ),
            ),
            // Followers of a user, newest first
            (
                doc! { "following_id": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("followers_recent_index".to_string())
                        .build(),
                ),
            ),
            // Who a user follows, newest first
            (
                doc! { "follower_id": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("following_recent_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for FollowEdgeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
