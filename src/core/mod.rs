//! Core module containing the domain types shared by every component

pub mod error;
pub mod identity;
pub mod policy;
pub mod query;
pub mod repository;
pub mod resource;
pub mod validation;

pub use error::{
    ApiError, AuthError, AuthorizationError, ErrorKind, RepositoryError, ValidationError,
};
pub use identity::{Identity, IdentityStatus};
pub use policy::{Action, AuthorizationEvaluator, Decision, RoleGrants};
pub use query::{Cursor, ListQuery, Page, PageRequest};
pub use repository::ResourceRepository;
pub use resource::{Resource, ResourcePayload};
