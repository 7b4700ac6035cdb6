//! Bearer token lifecycle: issue, verify, refresh rotation and revocation
//!
//! Tokens are HS256 JWTs carrying a snapshot of the holder's roles. Access
//! tokens are short-lived; refresh tokens are long-lived and single-use: a
//! refresh denies the presented token before issuing a new pair.

use crate::auth::identity_store::IdentityStore;
use crate::auth::token_store::TokenStore;
use crate::config::SecurityConfig;
use crate::core::error::{ApiError, AuthError};
use crate::core::identity::Identity;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Which half of a pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id
    pub sub: Uuid,
    pub kind: TokenKind,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token id, the deny-list key
    pub jti: Uuid,
    /// Roles held when the token was issued
    pub roles: BTreeSet<String>,
}

impl Claims {
    /// First instant at which the token no longer verifies
    ///
    /// `exp` has whole-second precision and still passes validation during
    /// the second it names, so the token dies one second after `exp`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp.saturating_add(1), 0)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Token response returned to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Issues and checks bearer tokens
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    store: Arc<dyn TokenStore>,
    identities: Arc<dyn IdentityStore>,
}

impl TokenService {
    pub fn new(
        config: &SecurityConfig,
        store: Arc<dyn TokenStore>,
        identities: Arc<dyn IdentityStore>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.signing_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_key.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            access_ttl: config.access_ttl(),
            refresh_ttl: config.refresh_ttl(),
            store,
            identities,
        }
    }

    /// Issue an access/refresh pair for an identity
    pub async fn issue(&self, identity: &Identity) -> Result<TokenPair, ApiError> {
        let access = self.mint(identity, TokenKind::Access, self.access_ttl)?;
        let refresh = self.mint(identity, TokenKind::Refresh, self.refresh_ttl)?;

        for claims in [&access.1, &refresh.1] {
            self.store
                .record_issued(claims.sub, claims.jti, claims.expires_at())
                .await
                .map_err(ApiError::Internal)?;
        }

        tracing::debug!(subject = %identity.id, "issued token pair");

        Ok(TokenPair {
            access_token: access.0,
            refresh_token: refresh.0,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Check signature, then expiry, then the deny-list
    pub async fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, ApiError> {
        let claims = self.decode(token)?;
        if claims.kind != expected {
            return Err(AuthError::Invalid.into());
        }
        if self
            .store
            .is_denied(&claims.jti)
            .await
            .map_err(ApiError::Internal)?
        {
            tracing::warn!(subject = %claims.sub, jti = %claims.jti, "revoked token presented");
            return Err(AuthError::Revoked.into());
        }
        Ok(claims)
    }

    /// Rotate a refresh token into a new pair
    ///
    /// The presented token is denied first; of two concurrent refreshes with
    /// the same token exactly one wins and the other gets `Revoked`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let claims = self.verify(refresh_token, TokenKind::Refresh).await?;

        let inserted = self
            .store
            .deny(claims.jti, claims.expires_at())
            .await
            .map_err(ApiError::Internal)?;
        if !inserted {
            tracing::warn!(subject = %claims.sub, jti = %claims.jti, "refresh token replayed");
            return Err(AuthError::Revoked.into());
        }

        match self.identities.get(&claims.sub).await? {
            Some(identity) if identity.is_active() => self.issue(&identity).await,
            _ => {
                tracing::warn!(subject = %claims.sub, "refresh for missing or suspended identity");
                Err(AuthError::Revoked.into())
            }
        }
    }

    /// Deny a single token of either kind
    pub async fn revoke(&self, token: &str) -> Result<(), ApiError> {
        let claims = self.decode(token)?;
        self.deny(&claims).await
    }

    /// Deny a token only if it was issued to `subject`
    pub async fn revoke_owned(&self, token: &str, subject: &Uuid) -> Result<(), ApiError> {
        let claims = self.decode(token)?;
        if claims.sub != *subject {
            tracing::warn!(
                subject = %subject,
                owner = %claims.sub,
                "revocation of a foreign token refused"
            );
            return Err(AuthError::Invalid.into());
        }
        self.deny(&claims).await
    }

    async fn deny(&self, claims: &Claims) -> Result<(), ApiError> {
        self.store
            .deny(claims.jti, claims.expires_at())
            .await
            .map_err(ApiError::Internal)?;
        tracing::debug!(subject = %claims.sub, jti = %claims.jti, "token revoked");
        Ok(())
    }

    /// Deny every unexpired token issued to an identity; returns how many
    /// were newly denied
    pub async fn revoke_all(&self, subject: &Uuid) -> Result<usize, ApiError> {
        let issued = self
            .store
            .issued_for(subject, Utc::now())
            .await
            .map_err(ApiError::Internal)?;

        let mut denied = 0;
        for token in issued {
            if self
                .store
                .deny(token.jti, token.expires_at)
                .await
                .map_err(ApiError::Internal)?
            {
                denied += 1;
            }
        }

        tracing::info!(subject = %subject, denied, "revoked all tokens");
        Ok(denied)
    }

    /// Remove deny-list entries for tokens that have expired anyway
    pub async fn prune_expired(&self) -> Result<usize, ApiError> {
        let removed = self
            .store
            .prune_expired(Utc::now())
            .await
            .map_err(ApiError::Internal)?;
        if removed > 0 {
            tracing::debug!(removed, "pruned expired deny-list entries");
        }
        Ok(removed)
    }

    /// Run [`prune_expired`](Self::prune_expired) on a fixed interval
    pub fn spawn_pruner(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = service.prune_expired().await {
                    e.log_if_internal("token pruner");
                }
            }
        })
    }

    fn mint(
        &self,
        identity: &Identity,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<(String, Claims), ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.id,
            kind,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4(),
            roles: identity.roles.clone(),
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    fn sign(&self, claims: &Claims) -> Result<String, ApiError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| ApiError::internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            })
    }
}
