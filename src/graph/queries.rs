//! Read-only social queries: counts, mutuals, suggestions

use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::db::schemas::{UserDoc, UserProfile};
use crate::identity::{require_caller, IdentityResolver};
use crate::store::{BlockStore, FollowStore, UserStore, MAX_PAGE_SIZE};
use crate::types::{GrapevineError, Result};

/// Edges inspected per mutual-follow scan; a bounded approximation for
/// accounts following more than this many users.
const MUTUAL_SCAN_CAP: i64 = 100;

/// Recent users fetched as the suggestion candidate pool
const SUGGESTION_POOL: i64 = 100;

/// Follower and following totals for one user
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FollowCounts {
    pub followers: u64,
    pub following: u64,
}

/// Profile-header read: totals plus the caller's relation to the target
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FollowStats {
    pub followers: u64,
    pub following: u64,
    pub is_following: bool,
    pub is_followed_by: bool,
}

/// Read-only analytics over the relationship store
pub struct SocialQueries {
    follows: Arc<dyn FollowStore>,
    blocks: Arc<dyn BlockStore>,
    users: Arc<dyn UserStore>,
    identity: Arc<dyn IdentityResolver>,
}

impl SocialQueries {
    pub fn new(
        follows: Arc<dyn FollowStore>,
        blocks: Arc<dyn BlockStore>,
        users: Arc<dyn UserStore>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            follows,
            blocks,
            users,
            identity,
        }
    }

    /// Follower and following totals, counted from the edge indexes.
    ///
    /// Uncached full counts; acceptable at catalog-community scale and the
    /// first thing to revisit if edge cardinality grows.
    pub async fn follow_counts(&self, target_id: &str) -> Result<FollowCounts> {
        let target = self.require_user(target_id).await?;

        Ok(FollowCounts {
            followers: self.follows.count_followers(&target.id()).await?,
            following: self.follows.count_following(&target.id()).await?,
        })
    }

    /// Users both the caller and the target follow.
    ///
    /// Scans the target's newest follow edges, at most [`MUTUAL_SCAN_CAP`],
    /// and keeps the first `limit` also present in the caller's following
    /// set. Anonymous callers get an empty list, never an error.
    pub async fn mutual_follows(
        &self,
        caller: Option<&str>,
        target_id: &str,
        limit: i64,
    ) -> Result<Vec<UserProfile>> {
        let target = self.require_user(target_id).await?;

        let caller = match caller {
            Some(external_id) => match self.identity.resolve(external_id).await? {
                Some(user) => user,
                None => return Ok(Vec::new()),
            },
            None => return Ok(Vec::new()),
        };
        let limit = limit.clamp(1, MAX_PAGE_SIZE) as usize;

        let caller_following: HashSet<String> =
            self.follows.following_ids(&caller.id()).await?.into_iter().collect();
        if caller_following.is_empty() {
            return Ok(Vec::new());
        }

        let target_edges = self
            .follows
            .following_of(&target.id(), MUTUAL_SCAN_CAP, None)
            .await?;

        let mut mutuals = Vec::new();
        for edge in target_edges {
            if mutuals.len() >= limit {
                break;
            }
            if !caller_following.contains(&edge.following_id) {
                continue;
            }
            match self.users.find_by_id(&edge.following_id).await? {
                Some(user) => mutuals.push(user.profile()),
                None => debug!("Skipping mutual {}: no longer resolves", edge.following_id),
            }
        }

        Ok(mutuals)
    }

    /// Candidate accounts for the caller to follow.
    ///
    /// Recent users minus the caller, everyone already followed, and any
    /// party with a block in either direction; shuffled so repeat calls
    /// rotate the pool. A placeholder heuristic until real affinity
    /// signals exist.
    pub async fn follow_suggestions(
        &self,
        caller: Option<&str>,
        limit: i64,
    ) -> Result<Vec<UserProfile>> {
        let caller = require_caller(self.identity.as_ref(), caller).await?;
        let caller_id = caller.id();
        let limit = limit.clamp(1, MAX_PAGE_SIZE) as usize;

        let pool = self.users.recent(SUGGESTION_POOL).await?;
        let following: HashSet<String> =
            self.follows.following_ids(&caller_id).await?.into_iter().collect();
        let blocked: HashSet<String> =
            self.blocks.involving(&caller_id).await?.into_iter().collect();

        let mut candidates: Vec<UserProfile> = pool
            .into_iter()
            .filter(|u| {
                let id = u.id();
                id != caller_id && !following.contains(&id) && !blocked.contains(&id)
            })
            .map(|u| u.profile())
            .collect();

        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Totals plus both relation flags in one call.
    ///
    /// Anonymous callers get both flags false.
    pub async fn follow_stats(&self, caller: Option<&str>, target_id: &str) -> Result<FollowStats> {
        let target = self.require_user(target_id).await?;
        let target_id = target.id();

        let followers = self.follows.count_followers(&target_id).await?;
        let following = self.follows.count_following(&target_id).await?;

        let caller = match caller {
            Some(external_id) => self.identity.resolve(external_id).await?,
            None => None,
        };

        let (is_following, is_followed_by) = match caller {
            Some(user) => {
                let caller_id = user.id();
                (
                    self.follows.exists(&caller_id, &target_id).await?,
                    self.follows.exists(&target_id, &caller_id).await?,
                )
            }
            None => (false, false),
        };

        Ok(FollowStats {
            followers,
            following,
            is_following,
            is_followed_by,
        })
    }

    async fn require_user(&self, user_id: &str) -> Result<UserDoc> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| GrapevineError::NotFound(format!("user {} not found", user_id)))
    }
}
