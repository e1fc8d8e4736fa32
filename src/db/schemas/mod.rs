//! Database schemas for grapevine
//!
//! Defines MongoDB document structures for users, follow and block edges,
//! notifications, and rate-limit entries.

mod block;
mod follow;
mod metadata;
mod notification;
mod rate_entry;
mod user;

pub use block::{BlockEdgeDoc, BLOCK_COLLECTION};
pub use follow::{FollowEdgeDoc, FOLLOW_COLLECTION};
pub use metadata::Metadata;
pub use notification::{
    NotificationDoc, NotificationKind, TargetKind, TargetRef, NOTIFICATION_COLLECTION,
};
pub use rate_entry::{RateEntryDoc, RATE_ENTRY_COLLECTION};
pub use user::{UserDoc, UserProfile, USER_COLLECTION};
