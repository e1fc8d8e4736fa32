//! User document schema
//!
//! Maps external identities to internal user records. The unique index on
//! `external_id` is what guarantees at most one internal user per external
//! identity, including under concurrent registration.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Stable identifier supplied by the external identity provider
    pub external_id: String,

    /// Unique handle shown in listings
    pub username: String,

    /// Display name for profile rendering
    #[serde(default)]
    pub display_name: String,

    /// Avatar URL, if the user has set one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Whether the user account is active
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    /// Create a new user document
    pub fn new(external_id: String, username: String, display_name: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            external_id,
            username,
            display_name,
            avatar_url: None,
            is_active: true,
        }
    }

    /// Internal user id as a hex string, empty before insertion
    pub fn id(&self) -> String {
        self._id.map(|o| o.to_hex()).unwrap_or_default()
    }

    /// Public profile projection used in listings and notification feeds
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Public profile fields safe to surface to any caller
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on the external identity
            (
                doc! { "external_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("external_id_unique".to_string())
                        .build(),
                ),
            ),
            // Index on username for handle lookups
            (
                doc! { "username": 1 },
                Some(
                    IndexOptions::builder()
                        .name("username_index".to_string())
                        .build(),
                ),
            ),
            // Recency index for the suggestion candidate pool
            (
                doc! { "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("created_at_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
