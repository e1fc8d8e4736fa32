//! Block edge schema
//!
//! Directed blocker -> blocked edge with the same pair-uniqueness rules as
//! follow edges. A block suppresses new follows toward the blocker and
//! notification writes from the blocked party; it does not retroactively
//! remove existing follow edges.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for block edges
pub const BLOCK_COLLECTION: &str = "blocks";

/// Block edge document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BlockEdgeDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata; created_at is the block timestamp
    #[serde(default)]
    pub metadata: Metadata,

    /// User who blocks
    pub blocker_id: String,

    /// User being blocked
    pub blocked_id: String,
}

impl BlockEdgeDoc {
    pub fn new(blocker_id: String, blocked_id: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            blocker_id,
            blocked_id,
        }
    }

    /// Edge id as a hex string, empty before insertion
    pub fn id(&self) -> String {
        self._id.map(|o| o.to_hex()).unwrap_or_default()
    }
}

impl IntoIndexes for BlockEdgeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One edge per ordered pair
            (
                doc! { "blocker_id": 1, "blocked_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("blocker_blocked_unique".to_string())
                        .build(),
                ),
            ),
            // Reverse lookups: who has blocked this user
            (
                doc! { "blocked_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("blocked_by_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for BlockEdgeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
