//! Identity records held by the credential store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Lifecycle status of an identity
///
/// Identities are never physically deleted; suspension is the terminal
/// administrative state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Suspended,
}

/// A registered caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    /// Set by an administrator once the address is confirmed
    #[serde(default)]
    pub email_verified: bool,
    /// Argon2 PHC string, never the plaintext secret
    #[serde(skip_serializing, default)]
    pub secret_hash: String,
    pub roles: BTreeSet<String>,
    pub status: IdentityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(
        username: String,
        email: Option<String>,
        secret_hash: String,
        roles: BTreeSet<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            email_verified: false,
            secret_hash,
            roles,
            status: IdentityStatus::Active,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    /// Update the updated_at timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether `identifier` names this identity (username or email)
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.username == identifier
            || self
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(identifier))
    }
}
