//! Rate-limit window entry schema
//!
//! One document per accepted request. Keys are intentionally not unique;
//! the entry count inside a trailing window is the whole point. Entries are
//! swept by the per-key eviction in check_and_record and by the global
//! maintenance sweep.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for rate-limit entries
pub const RATE_ENTRY_COLLECTION: &str = "rate_entries";

/// Rate window entry document
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RateEntryDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Caller-chosen bucket, e.g. "follow:{user_id}"
    pub key: String,

    /// When the request was accepted. Kept separate from metadata so the
    /// limiter can record caller-supplied clock readings.
    pub timestamp: DateTime,
}

impl RateEntryDoc {
    pub fn new(key: String, timestamp_ms: i64) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            key,
            timestamp: DateTime::from_millis(timestamp_ms),
        }
    }
}

// bson::DateTime has no Default, so the derive cannot supply the epoch
// placeholder the collection bounds need.
impl Default for RateEntryDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            key: String::new(),
            timestamp: DateTime::from_millis(0),
        }
    }
}

impl IntoIndexes for RateEntryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Window counting and per-key eviction
            (
                doc! { "key": 1, "timestamp": 1 },
                Some(
                    IndexOptions::builder()
                        .name("key_timestamp_index".to_string())
                        .build(),
                ),
            ),
            // Global sweep scans
            (
                doc! { "timestamp": 1 },
                Some(
                    IndexOptions::builder()
                        .name("timestamp_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for RateEntryDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
