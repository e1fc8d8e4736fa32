//! Relationship store and social queries
//!
//! Follow and block edges with store-enforced uniqueness, plus the read-only
//! analytics built on top of them (counts, mutuals, suggestions).

mod blocks;
mod follows;
mod queries;

pub use blocks::{BlockService, BlockedEntry};
pub use follows::{FollowGraph, FollowListEntry};
pub use queries::{FollowCounts, FollowStats, SocialQueries};
