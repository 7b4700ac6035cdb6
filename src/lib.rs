//! # Gatehouse
//!
//! A secured CRUD resource library: bearer-token authentication, role-based
//! authorization and a generic, version-fenced resource repository behind one
//! request pipeline.
//!
//! ## Features
//!
//! - **Token lifecycle**: HS256 access/refresh pairs, single-use refresh rotation, deny-list revocation
//! - **Credential store**: argon2 secret hashing, registration, secret rotation, suspension
//! - **Fail-closed authorization**: role grants with `:own` scoping, negative grants and wildcards
//! - **Generic repositories**: optimistic concurrency, JSON merge patch, keyset pagination
//! - **Uniform envelope**: every operation returns `{status, data?, error?}`
//! - **REST exposure**: axum routes and a static API contract
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gatehouse::prelude::*;
//!
//! #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
//! struct Note {
//!     #[validate(length(min = 1, max = 120))]
//!     name: String,
//! }
//!
//! impl ResourcePayload for Note {
//!     fn resource_type() -> &'static str { "note" }
//!     fn schema() -> PayloadSchema {
//!         PayloadSchema::new("note").field(FieldSchema::string("name").required())
//!     }
//! }
//!
//! let app = ServerBuilder::new()
//!     .with_config(SecurityConfig::from_yaml_file("gatehouse.yaml")?)
//!     .register_resource(InMemoryResourceRepository::<Note>::new())
//!     .build()?;
//! ```

pub mod auth;
pub mod config;
pub mod core;
pub mod server;
pub mod storage;
pub mod telemetry;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        error::{ApiError, AuthError, AuthorizationError, ErrorKind, RepositoryError, ValidationError},
        identity::{Identity, IdentityStatus},
        policy::{Action, AuthorizationEvaluator, Decision, RoleGrants},
        query::{Cursor, ListQuery, Page, PageRequest},
        repository::ResourceRepository,
        resource::{Resource, ResourcePayload},
        validation::{FieldSchema, FieldType, PayloadSchema, ValidationMode, filters, validators},
    };

    // === Auth ===
    pub use crate::auth::{
        CredentialStore, IdentityStore, InMemoryIdentityStore, InMemoryTokenStore, NewIdentity,
        TokenKind, TokenPair, TokenService, TokenStore,
    };

    // === Storage ===
    pub use crate::storage::InMemoryResourceRepository;

    // === Config ===
    pub use crate::config::{RoleChangePolicy, SecurityConfig};

    // === Server ===
    pub use crate::server::{
        ApiContract, OperationRequest, OperationResponse, RequestPipeline, ResourceRegistry,
        ServerBuilder, ServerHost,
    };

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use uuid::Uuid;
    pub use validator::Validate;
}
