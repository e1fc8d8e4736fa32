//! Notification target resolution
//!
//! Notifications reference catalog entities (logs, threads, replies) by
//! opaque id. Resolving those ids into displayable entities belongs to the
//! catalog service, reached through this trait. A resolution miss keeps the
//! notification with an unresolved target; it never fails the feed.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::db::schemas::TargetKind;
use crate::types::Result;

/// Resolves notification targets into displayable entities
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Look up the entity behind a target reference, if it still exists
    async fn resolve(&self, kind: TargetKind, target_id: &str) -> Result<Option<Value>>;
}

/// Resolver that knows nothing; every target stays unresolved
#[derive(Default)]
pub struct NullContentResolver;

#[async_trait]
impl ContentResolver for NullContentResolver {
    async fn resolve(&self, _kind: TargetKind, _target_id: &str) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Fixed entity table for tests and local fixtures
#[derive(Default)]
pub struct StaticContentResolver {
    entities: HashMap<String, Value>,
}

impl StaticContentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, kind: TargetKind, target_id: &str, entity: Value) -> Self {
        self.entities.insert(entity_key(kind, target_id), entity);
        self
    }
}

#[async_trait]
impl ContentResolver for StaticContentResolver {
    async fn resolve(&self, kind: TargetKind, target_id: &str) -> Result<Option<Value>> {
        Ok(self.entities.get(&entity_key(kind, target_id)).cloned())
    }
}

fn entity_key(kind: TargetKind, target_id: &str) -> String {
    format!("{}:{}", kind.as_str(), target_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_resolver_lookup() {
        let resolver = StaticContentResolver::new().with_entity(
            TargetKind::Log,
            "log-1",
            json!({ "title": "Blade Runner", "rating": 5 }),
        );

        let hit = resolver.resolve(TargetKind::Log, "log-1").await.unwrap();
        assert_eq!(hit.unwrap()["title"], "Blade Runner");

        let miss = resolver.resolve(TargetKind::Thread, "log-1").await.unwrap();
        assert!(miss.is_none());
    }
}
