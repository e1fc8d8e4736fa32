//! Block and unblock

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::db::schemas::{UserDoc, UserProfile};
use crate::identity::{require_caller, IdentityResolver};
use crate::store::{BlockStore, Cursor, InsertOutcome, Page, UserStore, MAX_PAGE_SIZE};
use crate::types::{GrapevineError, Result};

/// One row of a blocked-users listing
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BlockedEntry {
    pub profile: UserProfile,
    pub blocked_at_ms: i64,
}

/// Block-edge mutations and listings
pub struct BlockService {
    blocks: Arc<dyn BlockStore>,
    users: Arc<dyn UserStore>,
    identity: Arc<dyn IdentityResolver>,
}

impl BlockService {
    pub fn new(
        blocks: Arc<dyn BlockStore>,
        users: Arc<dyn UserStore>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            blocks,
            users,
            identity,
        }
    }

    /// Create a block edge from the caller to the target.
    ///
    /// Existing follow edges in either direction stay untouched; blocking
    /// only prevents new follows toward the blocker and suppresses future
    /// notifications from the blocked user.
    pub async fn block(&self, caller: Option<&str>, target_id: &str) -> Result<()> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;
        let caller_id = caller.id();

        let target = self.require_user(target_id).await?;
        let target_id = target.id();

        if caller_id == target_id {
            return Err(GrapevineError::SelfReference(
                "cannot block yourself".to_string(),
            ));
        }

        match self.blocks.insert(&caller_id, &target_id).await? {
            InsertOutcome::Created => {
                debug!("User {} blocked {}", caller_id, target_id);
                Ok(())
            }
            InsertOutcome::Duplicate => Err(GrapevineError::AlreadyExists(format!(
                "already blocking user {}",
                target_id
            ))),
        }
    }

    /// Remove the caller's block edge to the target
    pub async fn unblock(&self, caller: Option<&str>, target_id: &str) -> Result<()> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;

        if self.blocks.delete(&caller.id(), target_id).await? {
            debug!("User {} unblocked {}", caller.id(), target_id);
            Ok(())
        } else {
            Err(GrapevineError::NotFound(format!(
                "not blocking user {}",
                target_id
            )))
        }
    }

    /// Whether the caller blocks the target; `false` for anonymous or
    /// unresolvable callers, never an authentication error.
    pub async fn is_blocking(&self, caller: Option<&str>, target_id: &str) -> Result<bool> {
        let external_id = match caller {
            Some(id) => id,
            None => return Ok(false),
        };
        let caller = match self.identity.resolve(external_id).await? {
            Some(user) => user,
            None => return Ok(false),
        };

        self.blocks.exists(&caller.id(), target_id).await
    }

    /// Most-recent-first page of the users the caller has blocked
    pub async fn get_blocked(
        &self,
        caller: Option<&str>,
        limit: i64,
        cursor: Option<&str>,
    ) -> Result<Page<BlockedEntry>> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let cursor = Cursor::decode_opt(cursor)?;

        let edges = self
            .blocks
            .blocked_of(&caller.id(), limit, cursor.as_ref())
            .await?;

        let next_cursor = if (edges.len() as i64) < limit {
            None
        } else {
            edges
                .last()
                .map(|e| Cursor::new(e.metadata.created_at_ms(), e.id()).encode())
        };

        let mut items = Vec::with_capacity(edges.len());
        for edge in &edges {
            match self.users.find_by_id(&edge.blocked_id).await? {
                Some(user) => items.push(BlockedEntry {
                    profile: user.profile(),
                    blocked_at_ms: edge.metadata.created_at_ms(),
                }),
                None => debug!(
                    "Dropping block edge {}: user {} no longer resolves",
                    edge.id(),
                    edge.blocked_id
                ),
            }
        }

        Ok(Page { items, next_cursor })
    }

    async fn require_user(&self, user_id: &str) -> Result<UserDoc> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| GrapevineError::NotFound(format!("user {} not found", user_id)))
    }
}
