//! Follow and unfollow, with rate limiting and fan-out

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::schemas::{FollowEdgeDoc, NotificationKind, UserDoc, UserProfile};
use crate::identity::{require_caller, IdentityResolver};
use crate::notify::{NewNotification, NotificationEngine};
use crate::ratelimit::{RateDecision, RateLimiter};
use crate::store::{BlockStore, Cursor, FollowStore, InsertOutcome, Page, UserStore, MAX_PAGE_SIZE};
use crate::types::{GrapevineError, Result};

/// Default follow budget per window
const DEFAULT_FOLLOW_RATE_LIMIT: u64 = 30;

/// Default follow rate window, one hour
const DEFAULT_FOLLOW_RATE_WINDOW_MS: i64 = 3_600_000;

/// One row of a followers/following listing
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FollowListEntry {
    pub profile: UserProfile,
    pub followed_at_ms: i64,
}

/// Follow-edge mutations and listings
pub struct FollowGraph {
    follows: Arc<dyn FollowStore>,
    blocks: Arc<dyn BlockStore>,
    users: Arc<dyn UserStore>,
    identity: Arc<dyn IdentityResolver>,
    engine: Arc<NotificationEngine>,
    limiter: Arc<RateLimiter>,
    rate_limit: u64,
    rate_window_ms: i64,
}

impl FollowGraph {
    pub fn new(
        follows: Arc<dyn FollowStore>,
        blocks: Arc<dyn BlockStore>,
        users: Arc<dyn UserStore>,
        identity: Arc<dyn IdentityResolver>,
        engine: Arc<NotificationEngine>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            follows,
            blocks,
            users,
            identity,
            engine,
            limiter,
            rate_limit: DEFAULT_FOLLOW_RATE_LIMIT,
            rate_window_ms: DEFAULT_FOLLOW_RATE_WINDOW_MS,
        }
    }

    /// Override the follow budget, `limit` actions per `window_ms`
    pub fn with_follow_rate(mut self, limit: u64, window_ms: i64) -> Self {
        self.rate_limit = limit;
        self.rate_window_ms = window_ms.max(1);
        self
    }

    /// Create a follow edge from the caller to the target.
    ///
    /// The rate check runs before target validation, so a rejected follow
    /// still consumes window budget. Concurrent duplicate follows are
    /// settled by the store's unique pair constraint: exactly one caller
    /// sees success, the other `AlreadyExists`.
    ///
    /// The follow notification to the target is best-effort; its failure is
    /// logged and never surfaces to the caller.
    pub async fn follow(&self, caller: Option<&str>, target_id: &str) -> Result<()> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;
        let caller_id = caller.id();

        let key = format!("follow:{}", caller_id);
        let decision = self
            .limiter
            .check_and_record(&key, self.rate_limit, self.rate_window_ms)
            .await?;
        if let RateDecision::Denied { retry_after_ms } = decision {
            return Err(GrapevineError::RateLimited(format!(
                "follow limit reached, retry in {}ms",
                retry_after_ms
            )));
        }

        let target = self
            .users
            .find_by_id(target_id)
            .await?
            .ok_or_else(|| GrapevineError::NotFound(format!("user {} not found", target_id)))?;
        let target_id = target.id();

        if caller_id == target_id {
            return Err(GrapevineError::SelfReference(
                "cannot follow yourself".to_string(),
            ));
        }

        if self.follows.exists(&caller_id, &target_id).await? {
            return Err(GrapevineError::AlreadyExists(format!(
                "already following user {}",
                target_id
            )));
        }

        if self.blocks.exists(&target_id, &caller_id).await? {
            return Err(GrapevineError::Forbidden(
                "this user cannot be followed".to_string(),
            ));
        }

        match self.follows.insert(&caller_id, &target_id).await? {
            InsertOutcome::Created => {}
            // Lost the race to a concurrent identical follow
            InsertOutcome::Duplicate => {
                return Err(GrapevineError::AlreadyExists(format!(
                    "already following user {}",
                    target_id
                )));
            }
        }

        debug!("User {} followed {}", caller_id, target_id);

        let notification =
            NewNotification::new(target_id.clone(), caller_id, NotificationKind::Follow);
        if let Err(e) = self.engine.create(notification).await {
            warn!(
                "Failed to create follow notification for {}: {}",
                target_id, e
            );
        }

        Ok(())
    }

    /// Remove the caller's follow edge to the target.
    ///
    /// Fails `NotFound` when no edge exists, so callers can distinguish
    /// "already unfollowed" from success.
    pub async fn unfollow(&self, caller: Option<&str>, target_id: &str) -> Result<()> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;

        if self.follows.delete(&caller.id(), target_id).await? {
            debug!("User {} unfollowed {}", caller.id(), target_id);
            Ok(())
        } else {
            Err(GrapevineError::NotFound(format!(
                "not following user {}",
                target_id
            )))
        }
    }

    /// Whether the caller follows the target; `false` for anonymous or
    /// unresolvable callers, never an authentication error.
    pub async fn is_following(&self, caller: Option<&str>, target_id: &str) -> Result<bool> {
        let external_id = match caller {
            Some(id) => id,
            None => return Ok(false),
        };
        let caller = match self.identity.resolve(external_id).await? {
            Some(user) => user,
            None => return Ok(false),
        };

        self.follows.exists(&caller.id(), target_id).await
    }

    /// Most-recent-first page of the target's followers
    pub async fn get_followers(
        &self,
        target_id: &str,
        limit: i64,
        cursor: Option<&str>,
    ) -> Result<Page<FollowListEntry>> {
        let target = self.require_user(target_id).await?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let cursor = Cursor::decode_opt(cursor)?;

        let edges = self
            .follows
            .followers_of(&target.id(), limit, cursor.as_ref())
            .await?;
        self.edges_to_page(edges, limit, |e| e.follower_id.clone())
            .await
    }

    /// Most-recent-first page of the users the target follows
    pub async fn get_following(
        &self,
        target_id: &str,
        limit: i64,
        cursor: Option<&str>,
    ) -> Result<Page<FollowListEntry>> {
        let target = self.require_user(target_id).await?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let cursor = Cursor::decode_opt(cursor)?;

        let edges = self
            .follows
            .following_of(&target.id(), limit, cursor.as_ref())
            .await?;
        self.edges_to_page(edges, limit, |e| e.following_id.clone())
            .await
    }

    async fn require_user(&self, user_id: &str) -> Result<UserDoc> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| GrapevineError::NotFound(format!("user {} not found", user_id)))
    }

    /// Resolve edge endpoints into profiles, dropping vanished users.
    ///
    /// The continuation cursor advances over the raw edge page, dropped
    /// rows included, so pagination cannot stall on deleted accounts.
    async fn edges_to_page<F>(
        &self,
        edges: Vec<FollowEdgeDoc>,
        limit: i64,
        endpoint: F,
    ) -> Result<Page<FollowListEntry>>
    where
        F: Fn(&FollowEdgeDoc) -> String,
    {
        let next_cursor = if (edges.len() as i64) < limit {
            None
        } else {
            edges
                .last()
                .map(|e| Cursor::new(e.metadata.created_at_ms(), e.id()).encode())
        };

        let mut items = Vec::with_capacity(edges.len());
        for edge in &edges {
            let user_id = endpoint(edge);
            match self.users.find_by_id(&user_id).await? {
                Some(user) => items.push(FollowListEntry {
                    profile: user.profile(),
                    followed_at_ms: edge.metadata.created_at_ms(),
                }),
                None => debug!("Dropping edge {}: user {} no longer resolves", edge.id(), user_id),
            }
        }

        Ok(Page { items, next_cursor })
    }
}
