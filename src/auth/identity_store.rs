//! Identity persistence behind the credential store

use crate::core::error::ApiError;
use crate::core::identity::{Identity, IdentityStatus};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Storage for identities
///
/// Every mutator is a single atomic step and returns the updated record.
/// Missing identities yield `ApiError::NotFound`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert a new identity; duplicate username or email is a `Conflict`
    async fn insert(&self, identity: Identity) -> Result<Identity, ApiError>;

    async fn get(&self, id: &Uuid) -> Result<Option<Identity>, ApiError>;

    /// Look up by username first, then by email
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Identity>, ApiError>;

    async fn set_secret_hash(&self, id: &Uuid, secret_hash: String)
    -> Result<Identity, ApiError>;

    async fn set_status(&self, id: &Uuid, status: IdentityStatus) -> Result<Identity, ApiError>;

    async fn set_roles(&self, id: &Uuid, roles: BTreeSet<String>) -> Result<Identity, ApiError>;

    async fn set_email_verified(&self, id: &Uuid, verified: bool)
    -> Result<Identity, ApiError>;

    async fn record_login(&self, id: &Uuid, at: DateTime<Utc>) -> Result<Identity, ApiError>;
}

/// In-memory identity store
#[derive(Clone, Default)]
pub struct InMemoryIdentityStore {
    identities: Arc<RwLock<HashMap<Uuid, Identity>>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn modify(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut Identity),
    ) -> Result<Identity, ApiError> {
        let mut identities = self
            .identities
            .write()
            .map_err(|e| ApiError::internal(anyhow!("Failed to acquire write lock: {}", e)))?;

        let identity = identities
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found("identity", id))?;
        f(identity);
        Ok(identity.clone())
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn insert(&self, identity: Identity) -> Result<Identity, ApiError> {
        let mut identities = self
            .identities
            .write()
            .map_err(|e| ApiError::internal(anyhow!("Failed to acquire write lock: {}", e)))?;

        for existing in identities.values() {
            if existing.username == identity.username {
                return Err(ApiError::conflict(format!(
                    "username '{}' is already taken",
                    identity.username
                )));
            }
            if let (Some(a), Some(b)) = (&existing.email, &identity.email) {
                if a.eq_ignore_ascii_case(b) {
                    return Err(ApiError::conflict(format!(
                        "email '{}' is already registered",
                        b
                    )));
                }
            }
        }

        identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Identity>, ApiError> {
        let identities = self
            .identities
            .read()
            .map_err(|e| ApiError::internal(anyhow!("Failed to acquire read lock: {}", e)))?;
        Ok(identities.get(id).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Identity>, ApiError> {
        let identities = self
            .identities
            .read()
            .map_err(|e| ApiError::internal(anyhow!("Failed to acquire read lock: {}", e)))?;

        let by_username = identities.values().find(|i| i.username == identifier);
        let found = by_username.or_else(|| {
            identities
                .values()
                .find(|i| i.matches_identifier(identifier))
        });
        Ok(found.cloned())
    }

    async fn set_secret_hash(
        &self,
        id: &Uuid,
        secret_hash: String,
    ) -> Result<Identity, ApiError> {
        self.modify(id, |identity| {
            identity.secret_hash = secret_hash;
            identity.touch();
        })
    }

    async fn set_status(&self, id: &Uuid, status: IdentityStatus) -> Result<Identity, ApiError> {
        self.modify(id, |identity| {
            identity.status = status;
            identity.touch();
        })
    }

    async fn set_roles(&self, id: &Uuid, roles: BTreeSet<String>) -> Result<Identity, ApiError> {
        self.modify(id, |identity| {
            identity.roles = roles;
            identity.touch();
        })
    }

    async fn set_email_verified(
        &self,
        id: &Uuid,
        verified: bool,
    ) -> Result<Identity, ApiError> {
        self.modify(id, |identity| {
            identity.email_verified = verified;
            identity.touch();
        })
    }

    async fn record_login(&self, id: &Uuid, at: DateTime<Utc>) -> Result<Identity, ApiError> {
        self.modify(id, |identity| identity.last_login_at = Some(at))
    }
}
