//! Identity registration and credential checks

use crate::auth::identity_store::IdentityStore;
use crate::auth::password::{SecretHasher, check_secret};
use crate::auth::tokens::{Claims, TokenPair, TokenService};
use crate::config::SecurityConfig;
use crate::core::error::{ApiError, AuthError, AuthorizationError, ValidationError};
use crate::core::identity::{Identity, IdentityStatus};
use crate::core::policy::RoleGrants;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Registration request
///
/// Carries no roles: self-registered identities always receive the
/// configured `defaultRoles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIdentity {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub secret: String,
}

/// Owns identities and their secrets
pub struct CredentialStore {
    identities: Arc<dyn IdentityStore>,
    tokens: Arc<TokenService>,
    hasher: SecretHasher,
    role_grants: RoleGrants,
    default_roles: BTreeSet<String>,
    admin_roles: BTreeSet<String>,
    username_pattern: Regex,
}

impl CredentialStore {
    pub fn new(
        config: &SecurityConfig,
        identities: Arc<dyn IdentityStore>,
        tokens: Arc<TokenService>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            identities,
            tokens,
            hasher: SecretHasher::new(&config.password_hashing)?,
            role_grants: config.role_grants.clone(),
            default_roles: config.default_roles.clone(),
            admin_roles: config.admin_roles.clone(),
            username_pattern: Regex::new(r"^[A-Za-z0-9_.\-]{3,50}$")?,
        })
    }

    /// Create a new active identity holding the default roles
    pub async fn register(&self, request: NewIdentity) -> Result<Identity, ApiError> {
        let roles = self.default_roles.clone();
        self.create(request, roles).await
    }

    /// Create an identity with explicit roles
    ///
    /// Only reachable through the administration routes.
    pub async fn provision(
        &self,
        request: NewIdentity,
        roles: BTreeSet<String>,
    ) -> Result<Identity, ApiError> {
        self.create(request, roles).await
    }

    async fn create(
        &self,
        request: NewIdentity,
        roles: BTreeSet<String>,
    ) -> Result<Identity, ApiError> {
        self.check_registration(&request, &roles)?;

        let secret_hash = self.hash(request.secret).await?;
        let email = request.email.map(|e| e.trim().to_string());
        let identity = self
            .identities
            .insert(Identity::new(request.username, email, secret_hash, roles))
            .await?;

        tracing::info!(subject = %identity.id, username = %identity.username, "identity registered");
        Ok(identity)
    }

    /// Check an identifier (username or email) and secret
    ///
    /// Unknown identifiers, wrong secrets and suspended identities all yield
    /// `InvalidCredentials`.
    pub async fn verify(&self, identifier: &str, secret: &str) -> Result<Identity, ApiError> {
        let Some(identity) = self.identities.find_by_identifier(identifier).await? else {
            let hasher = self.hasher.clone();
            let secret = secret.to_string();
            tokio::task::spawn_blocking(move || hasher.verify_dummy(&secret))
                .await
                .map_err(ApiError::internal)?;
            tracing::warn!("login attempt for unknown identifier");
            return Err(AuthError::InvalidCredentials.into());
        };

        let matches = self.check_hash(secret, &identity.secret_hash).await?;
        if !matches || !identity.is_active() {
            tracing::warn!(subject = %identity.id, "rejected login");
            return Err(AuthError::InvalidCredentials.into());
        }

        let identity = self.identities.record_login(&identity.id, Utc::now()).await?;
        tracing::info!(subject = %identity.id, "login succeeded");
        Ok(identity)
    }

    /// Verify credentials and issue a token pair
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<TokenPair, ApiError> {
        let identity = self.verify(identifier, secret).await?;
        self.tokens.issue(&identity).await
    }

    /// Replace a secret and revoke every outstanding token of the identity
    pub async fn rotate_secret(
        &self,
        id: &Uuid,
        old_secret: &str,
        new_secret: &str,
    ) -> Result<(), ApiError> {
        let Some(identity) = self.identities.get(id).await? else {
            return Err(AuthError::InvalidCredentials.into());
        };
        if !self.check_hash(old_secret, &identity.secret_hash).await? {
            tracing::warn!(subject = %id, "secret rotation with wrong secret");
            return Err(AuthError::InvalidCredentials.into());
        }
        check_secret("newSecret", new_secret)?;

        let secret_hash = self.hash(new_secret.to_string()).await?;
        self.identities.set_secret_hash(id, secret_hash).await?;
        self.tokens.revoke_all(id).await?;

        tracing::info!(subject = %id, "secret rotated");
        Ok(())
    }

    /// Set a new secret without the old one and revoke every token
    pub async fn reset_secret(&self, id: &Uuid, new_secret: &str) -> Result<(), ApiError> {
        check_secret("newSecret", new_secret)?;
        let secret_hash = self.hash(new_secret.to_string()).await?;
        self.identities.set_secret_hash(id, secret_hash).await?;
        self.tokens.revoke_all(id).await?;

        tracing::info!(subject = %id, "secret reset");
        Ok(())
    }

    pub async fn set_email_verified(
        &self,
        id: &Uuid,
        verified: bool,
    ) -> Result<Identity, ApiError> {
        let identity = self.identities.get(id).await?;
        if identity.as_ref().is_some_and(|i| i.email.is_none()) {
            return Err(
                ValidationError::single("email", "identity has no email address").into(),
            );
        }
        let identity = self.identities.set_email_verified(id, verified).await?;
        tracing::info!(subject = %id, verified, "email verification changed");
        Ok(identity)
    }

    /// Check that the holder of `claims` may administer identities
    ///
    /// Uses the stored identity, not the token's roles snapshot, so a demoted
    /// administrator loses access at once.
    pub async fn require_admin(&self, claims: &Claims) -> Result<Identity, ApiError> {
        let Some(identity) = self.identities.get(&claims.sub).await? else {
            return Err(AuthError::Revoked.into());
        };
        if !identity.is_active() {
            return Err(AuthError::Revoked.into());
        }
        if !identity.roles.iter().any(|r| self.admin_roles.contains(r)) {
            tracing::warn!(subject = %identity.id, "identity administration denied");
            return Err(AuthorizationError::Denied {
                action: "administer".to_string(),
                resource_type: "identity".to_string(),
            }
            .into());
        }
        Ok(identity)
    }

    /// Activate or suspend an identity; suspension revokes its tokens
    pub async fn set_status(&self, id: &Uuid, status: IdentityStatus) -> Result<Identity, ApiError> {
        let identity = self.identities.set_status(id, status).await?;
        if status == IdentityStatus::Suspended {
            self.tokens.revoke_all(id).await?;
        }
        tracing::info!(subject = %id, status = ?status, "identity status changed");
        Ok(identity)
    }

    /// Replace the roles of an identity
    ///
    /// Existing tokens keep their roles snapshot until refreshed; fresh-check
    /// actions see the change immediately.
    pub async fn assign_roles(
        &self,
        id: &Uuid,
        roles: BTreeSet<String>,
    ) -> Result<Identity, ApiError> {
        self.check_roles(&roles).into_result()?;
        let identity = self.identities.set_roles(id, roles).await?;
        tracing::info!(subject = %id, roles = ?identity.roles, "roles assigned");
        Ok(identity)
    }

    pub async fn get(&self, id: &Uuid) -> Result<Identity, ApiError> {
        self.identities
            .get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("identity", id))
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    fn check_registration(
        &self,
        request: &NewIdentity,
        roles: &BTreeSet<String>,
    ) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();

        if !self.username_pattern.is_match(&request.username) {
            errors.push(
                "username",
                "must be 3-50 characters of letters, digits, '_', '.' or '-'",
            );
        }
        if let Some(email) = &request.email {
            let email = email.trim();
            let valid = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                errors.push("email", "must be a valid email address");
            }
        }
        if let Err(e) = check_secret("secret", &request.secret) {
            errors.merge(e);
        }
        errors.merge(self.check_roles(roles));

        errors.into_result()
    }

    fn check_roles(&self, roles: &BTreeSet<String>) -> ValidationError {
        let mut errors = ValidationError::new();
        if let Some(unknown) = roles.iter().find(|r| !self.role_grants.contains_role(r)) {
            errors.push("roles", format!("unknown role '{}'", unknown));
        }
        errors
    }

    async fn hash(&self, secret: String) -> Result<String, ApiError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::Internal)
    }

    async fn check_hash(&self, secret: &str, hash: &str) -> Result<bool, ApiError> {
        let hasher = self.hasher.clone();
        let (secret, hash) = (secret.to_string(), hash.to_string());
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash))
            .await
            .map_err(ApiError::internal)
    }
}
