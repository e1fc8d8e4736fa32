//! MongoDB access layer
//!
//! Typed collection wrapper plus the document schemas for users, follow and
//! block edges, notifications, and rate-limit entries.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
