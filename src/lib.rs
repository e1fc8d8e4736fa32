//! Grapevine - social graph and notification engine
//!
//! The relationship and notification core of a social cataloguing app:
//! who follows whom, who blocked whom, what lands in each user's
//! notification feed, and how fast anyone is allowed to act.
//!
//! ## Services
//!
//! - **FollowGraph**: follow/unfollow edges with rate limiting and fan-out
//! - **BlockService**: block/unblock edges and the blocking predicate
//! - **NotificationEngine**: creation, feeds, read-state, retention
//! - **SocialQueries**: counts, mutual follows, follow suggestions
//! - **RateLimiter**: sliding-window accounting over a shared store
//!
//! Stores are trait objects with MongoDB and in-memory implementations, so
//! the whole stack runs against either backend.

pub mod config;
pub mod content;
pub mod db;
pub mod graph;
pub mod identity;
pub mod notify;
pub mod ratelimit;
pub mod store;
pub mod types;

pub use config::Args;
pub use graph::{BlockService, FollowGraph, SocialQueries};
pub use notify::{NewNotification, NotificationEngine};
pub use ratelimit::{RateDecision, RateLimiter};
pub use types::{GrapevineError, Result};
