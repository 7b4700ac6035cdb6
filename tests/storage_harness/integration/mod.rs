//! Integration test infrastructure: a fully wired host over `Note` resources.
//!
//! # Architecture
//!
//! ```text
//! TestApp
//!     ├─ host.credentials   provision / login / rotate / suspend
//!     ├─ host.tokens        issue / verify / refresh / revoke
//!     ├─ host.pipeline      POST /operations semantics without HTTP
//!     └─ router()           axum Router for axum_test::TestServer
//! ```
//!
//! Role table used by every fixture:
//!
//! | role      | grants                                               |
//! |-----------|------------------------------------------------------|
//! | `user`    | create, read:own, update:own, delete:own, list:own   |
//! | `admin`   | `*`                                                  |
//! | `auditor` | read, list, `!delete`                                |

use super::Note;
use axum::Router;
use axum_test::TestServer;
use gatehouse::auth::{InMemoryIdentityStore, InMemoryTokenStore, NewIdentity, TokenPair};
use gatehouse::config::{PasswordHashing, SecurityConfig};
use gatehouse::core::identity::Identity;
use gatehouse::core::policy::RoleGrants;
use gatehouse::core::repository::ResourceRepository;
use gatehouse::server::{
    OperationRequest, OperationResponse, ResourceRegistry, RestExposure, ServerHost,
};
use gatehouse::storage::InMemoryResourceRepository;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const TEST_SIGNING_KEY: &str = "integration-signing-key-0123456789abcdef";
pub const TEST_SECRET: &str = "correct horse battery";

pub fn test_grants() -> RoleGrants {
    RoleGrants::new()
        .with_role(
            "user",
            ["create", "read:own", "update:own", "delete:own", "list:own"],
        )
        .with_role("admin", ["*"])
        .with_role("auditor", ["read", "list", "!delete"])
}

/// Security configuration with cheap argon2 parameters
pub fn test_config() -> SecurityConfig {
    let mut config = SecurityConfig::new(TEST_SIGNING_KEY, test_grants());
    config.password_hashing = PasswordHashing {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    config
}

/// A wired host plus direct access to the note repository
pub struct TestApp {
    pub host: Arc<ServerHost>,
    pub notes: InMemoryResourceRepository<Note>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SecurityConfig) -> Self {
        let notes = InMemoryResourceRepository::<Note>::new();
        Self::with_repository(config, notes.clone(), notes)
    }

    /// Register `repository` as the note collection; `notes` is kept for
    /// direct inspection
    pub fn with_repository<R>(
        config: SecurityConfig,
        repository: R,
        notes: InMemoryResourceRepository<Note>,
    ) -> Self
    where
        R: ResourceRepository<Note> + 'static,
    {
        let mut registry = ResourceRegistry::new();
        registry.register_repository::<Note, R>(repository);

        let host = ServerHost::from_components(
            config,
            Arc::new(InMemoryIdentityStore::new()),
            Arc::new(InMemoryTokenStore::new()),
            registry,
        )
        .expect("test host should build");

        Self {
            host: Arc::new(host),
            notes,
        }
    }

    pub fn router(&self) -> Router {
        RestExposure::build_router(self.host.clone(), Vec::new())
    }

    pub fn server(&self) -> TestServer {
        TestServer::try_new(self.router()).expect("test server should start")
    }

    /// Provision an identity with the given roles
    pub async fn register(&self, username: &str, roles: &[&str]) -> Identity {
        self.host
            .credentials
            .provision(
                NewIdentity {
                    username: username.to_string(),
                    email: Some(format!("{}@example.com", username)),
                    secret: TEST_SECRET.to_string(),
                },
                roles.iter().map(|r| r.to_string()).collect::<BTreeSet<_>>(),
            )
            .await
            .expect("registration should succeed")
    }

    /// Register and log in
    pub async fn signup(&self, username: &str, roles: &[&str]) -> (Identity, TokenPair) {
        let identity = self.register(username, roles).await;
        let pair = self
            .host
            .credentials
            .login(username, TEST_SECRET)
            .await
            .expect("login should succeed");
        (identity, pair)
    }

    pub async fn execute(&self, request: OperationRequest) -> OperationResponse {
        self.host.pipeline.execute(request).await
    }

    /// Create a note as the holder of `token`; returns (id, version)
    pub async fn create_note(&self, token: &str, name: &str) -> (String, u64) {
        let response = self
            .execute(
                OperationRequest::new("create", "note")
                    .bearer(token)
                    .payload(super::note_json(name)),
            )
            .await;
        assert!(response.is_ok(), "create failed: {:?}", response.error);
        let data = response.data.expect("create returns the resource");
        let id = data["id"].as_str().expect("id is a string").to_string();
        let version = data["version"].as_u64().expect("version is a number");
        (id, version)
    }
}
