//! Deny-list and issued-token index
//!
//! Revoked token ids are kept until the token would have expired anyway;
//! after that the signature check alone rejects it and the entry can go.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

/// A token id recorded at issue time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedToken {
    pub jti: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Storage trait for token revocation state
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Remember that `jti` was issued to `subject`
    async fn record_issued(
        &self,
        subject: Uuid,
        jti: Uuid,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Deny a token id until `expires_at`
    ///
    /// Returns `true` only for the call that inserted the entry. This is the
    /// single check-and-set that makes refresh rotation race-free.
    async fn deny(&self, jti: Uuid, expires_at: DateTime<Utc>) -> anyhow::Result<bool>;

    async fn is_denied(&self, jti: &Uuid) -> anyhow::Result<bool>;

    /// Tokens issued to `subject` that have not expired by `now`
    async fn issued_for(&self, subject: &Uuid, now: DateTime<Utc>)
    -> anyhow::Result<Vec<IssuedToken>>;

    /// Drop entries whose expiry is at or before `now`; returns how many
    /// deny-list entries were removed
    async fn prune_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize>;
}

/// Sharded in-memory token store
#[derive(Default)]
pub struct InMemoryTokenStore {
    denied: DashMap<Uuid, DateTime<Utc>>,
    issued: DashMap<Uuid, Vec<IssuedToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denied_count(&self) -> usize {
        self.denied.len()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn record_issued(
        &self,
        subject: Uuid,
        jti: Uuid,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.issued
            .entry(subject)
            .or_default()
            .push(IssuedToken { jti, expires_at });
        Ok(())
    }

    async fn deny(&self, jti: Uuid, expires_at: DateTime<Utc>) -> anyhow::Result<bool> {
        match self.denied.entry(jti) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn is_denied(&self, jti: &Uuid) -> anyhow::Result<bool> {
        Ok(self.denied.contains_key(jti))
    }

    async fn issued_for(
        &self,
        subject: &Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<IssuedToken>> {
        Ok(self
            .issued
            .get(subject)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter(|t| t.expires_at > now)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let before = self.denied.len();
        self.denied.retain(|_, expires_at| *expires_at > now);
        let removed = before.saturating_sub(self.denied.len());

        self.issued.retain(|_, tokens| {
            tokens.retain(|t| t.expires_at > now);
            !tokens.is_empty()
        });

        Ok(removed)
    }
}
