//! Caller identity resolution
//!
//! The crate never authenticates anyone. An upstream identity provider hands
//! every request a stable external id; this module maps that id to the
//! internal user record. The trait keeps the mapping swappable (store-backed
//! for prod, a static table for tests and fixtures).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::schemas::UserDoc;
use crate::store::UserStore;
use crate::types::{GrapevineError, Result};

/// Resolves external identities to internal user records
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Look up the internal user for an external identity, if one exists
    async fn resolve(&self, external_id: &str) -> Result<Option<UserDoc>>;
}

/// Resolve the caller or fail with `Unauthenticated`.
///
/// Anonymous callers (`None`) and identities with no user record are both
/// rejected; mutating operations call this first.
pub async fn require_caller(
    identity: &dyn IdentityResolver,
    caller: Option<&str>,
) -> Result<UserDoc> {
    let external_id =
        caller.ok_or_else(|| GrapevineError::Unauthenticated("caller identity required".to_string()))?;

    identity.resolve(external_id).await?.ok_or_else(|| {
        GrapevineError::Unauthenticated(format!("no user for identity {}", external_id))
    })
}

/// Fields required to provision a user for a new external identity
#[derive(Debug, Clone)]
pub struct NewUser {
    pub external_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Store-backed resolver with get-or-create provisioning
pub struct StoreIdentityResolver {
    users: Arc<dyn UserStore>,
}

impl StoreIdentityResolver {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Get or create the internal user for an external identity.
    ///
    /// Concurrent first-login races are settled by the unique index on
    /// `external_id`: the losing insert re-reads the winner's record.
    pub async fn register(&self, new_user: NewUser) -> Result<UserDoc> {
        if let Some(existing) = self.users.find_by_external_id(&new_user.external_id).await? {
            return Ok(existing);
        }

        let mut user = UserDoc::new(
            new_user.external_id.clone(),
            new_user.username,
            new_user.display_name,
        );
        user.avatar_url = new_user.avatar_url;

        match self.users.insert(user).await {
            Ok(created) => Ok(created),
            Err(GrapevineError::AlreadyExists(_)) => self
                .users
                .find_by_external_id(&new_user.external_id)
                .await?
                .ok_or_else(|| {
                    GrapevineError::Database("user missing after registration conflict".to_string())
                }),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl IdentityResolver for StoreIdentityResolver {
    async fn resolve(&self, external_id: &str) -> Result<Option<UserDoc>> {
        self.users.find_by_external_id(external_id).await
    }
}

/// Fixed identity table for tests and local fixtures
#[derive(Default)]
pub struct StaticIdentityResolver {
    users: HashMap<String, UserDoc>,
}

impl StaticIdentityResolver {
    pub fn new(users: Vec<UserDoc>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.external_id.clone(), u))
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, external_id: &str) -> Result<Option<UserDoc>> {
        Ok(self.users.get(external_id).cloned())
    }
}
