//! Notification engine
//!
//! Creates, enriches, paginates, and retires notification records. Writes
//! consult the block graph so a blocked sender never produces a record;
//! reads enrich each record with the sender's profile and the resolved
//! target entity.

mod engine;

pub use engine::{NewNotification, NotificationEngine, NotificationView, TargetView};
