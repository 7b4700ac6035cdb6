//! Configuration loading and management

use crate::core::error::ConfigError;
use crate::core::policy::{Action, RoleGrants};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// Minimum HS256 key length in bytes
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// When a role change reaches callers that already hold tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleChangePolicy {
    /// Tokens keep their roles snapshot until refreshed, except for
    /// fresh-check actions
    #[default]
    AtNextRefresh,
    /// Every operation reloads the identity
    Immediate,
}

/// Argon2 cost parameters for secret hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordHashing {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashing {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

fn default_access_ttl() -> u64 {
    900
}

fn default_refresh_ttl() -> u64 {
    604_800
}

fn default_roles() -> BTreeSet<String> {
    BTreeSet::from(["user".to_string()])
}

fn default_admin_roles() -> BTreeSet<String> {
    BTreeSet::from(["admin".to_string()])
}

fn default_operation_timeout_ms() -> u64 {
    30_000
}

fn default_issuer() -> String {
    "gatehouse".to_string()
}

/// Security configuration shared by the token service, the credential store
/// and the request pipeline
///
/// # Example
///
/// ```yaml
/// signingKey: "0123456789abcdef0123456789abcdef"
/// accessTtl: 900
/// roleGrants:
///   user: ["create", "read:own", "update:own", "delete:own", "list:own"]
///   auditor: ["read", "list", "!delete"]
/// freshCheckActions: ["delete"]
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Access token lifetime in seconds
    #[serde(default = "default_access_ttl")]
    pub access_ttl: u64,

    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl: u64,

    /// HS256 secret
    pub signing_key: String,

    #[serde(default)]
    pub role_grants: RoleGrants,

    /// Roles given to every self-registered identity
    #[serde(default = "default_roles")]
    pub default_roles: BTreeSet<String>,

    /// Roles allowed on the identity administration routes
    #[serde(default = "default_admin_roles")]
    pub admin_roles: BTreeSet<String>,

    /// Actions for which the pipeline reloads the identity instead of trusting
    /// the token's roles snapshot
    #[serde(default)]
    pub fresh_check_actions: BTreeSet<Action>,

    #[serde(default)]
    pub role_change_policy: RoleChangePolicy,

    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default)]
    pub password_hashing: PasswordHashing,
}

impl SecurityConfig {
    /// Configuration with every optional key at its default
    pub fn new(signing_key: impl Into<String>, role_grants: RoleGrants) -> Self {
        Self {
            access_ttl: default_access_ttl(),
            refresh_ttl: default_refresh_ttl(),
            signing_key: signing_key.into(),
            role_grants,
            default_roles: default_roles(),
            admin_roles: default_admin_roles(),
            fresh_check_actions: BTreeSet::new(),
            role_change_policy: RoleChangePolicy::default(),
            operation_timeout_ms: default_operation_timeout_ms(),
            issuer: default_issuer(),
            password_hashing: PasswordHashing::default(),
        }
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every key; the first violation is reported
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(ConfigError::invalid(
                "signingKey",
                format!("must be at least {} bytes", MIN_SIGNING_KEY_LEN),
            ));
        }
        if self.access_ttl == 0 {
            return Err(ConfigError::invalid("accessTtl", "must be positive"));
        }
        if self.refresh_ttl <= self.access_ttl {
            return Err(ConfigError::invalid(
                "refreshTtl",
                "must be longer than accessTtl",
            ));
        }
        if let Some((role, error)) = self.role_grants.first_malformed() {
            return Err(ConfigError::invalid(format!("roleGrants.{}", role), error));
        }
        if let Some(role) = self
            .default_roles
            .iter()
            .find(|r| !self.role_grants.contains_role(r))
        {
            return Err(ConfigError::invalid(
                "defaultRoles",
                format!("role '{}' has no grants", role),
            ));
        }
        if let Some(role) = self.default_roles.intersection(&self.admin_roles).next() {
            return Err(ConfigError::invalid(
                "defaultRoles",
                format!("administrative role '{}' cannot be a default", role),
            ));
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::invalid("operationTimeoutMs", "must be positive"));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::invalid("issuer", "must not be empty"));
        }
        let hashing = &self.password_hashing;
        argon2::Params::new(
            hashing.memory_kib,
            hashing.iterations,
            hashing.parallelism,
            None,
        )
        .map_err(|e| ConfigError::invalid("passwordHashing", e.to_string()))?;

        Ok(())
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_ttl as i64)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_ttl as i64)
    }

    pub fn operation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.operation_timeout_ms)
    }

    /// Whether `action` must be authorized against the identity's current roles
    pub fn requires_fresh_check(&self, action: Action) -> bool {
        self.role_change_policy == RoleChangePolicy::Immediate
            || self.fresh_check_actions.contains(&action)
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("signing_key", &"<redacted>")
            .field("role_grants", &self.role_grants)
            .field("default_roles", &self.default_roles)
            .field("admin_roles", &self.admin_roles)
            .field("fresh_check_actions", &self.fresh_check_actions)
            .field("role_change_policy", &self.role_change_policy)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .field("issuer", &self.issuer)
            .field("password_hashing", &self.password_hashing)
            .finish()
    }
}
