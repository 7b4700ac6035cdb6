//! Typed error handling for gatehouse
//!
//! Every component returns a typed outcome. The request pipeline and the REST
//! binding are the only places where these are turned into a transport-facing
//! envelope.
//!
//! # Error Categories
//!
//! - [`AuthError`]: the caller could not be authenticated (401)
//! - [`AuthorizationError`]: the caller is authenticated but not allowed (403)
//! - [`ValidationError`]: the request payload violates the resource schema (422)
//! - [`RepositoryError`]: typed outcome of a repository call
//! - [`ConfigError`]: the security configuration is unusable
//! - [`ApiError`]: the union surfaced to callers
//!
//! # Example
//!
//! ```rust,ignore
//! match pipeline.tokens().verify(token, TokenKind::Access).await {
//!     Ok(claims) => println!("subject {}", claims.sub),
//!     Err(ApiError::Auth(AuthError::Expired)) => println!("refresh and retry"),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque message shown to callers for internal failures
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

// =============================================================================
// Authentication
// =============================================================================

/// Reasons a bearer token or a credential pair was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token expired")]
    Expired,

    #[error("invalid token")]
    Invalid,

    #[error("token revoked")]
    Revoked,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::Expired => "TOKEN_EXPIRED",
            AuthError::Invalid => "TOKEN_INVALID",
            AuthError::Revoked => "TOKEN_REVOKED",
        }
    }
}

// =============================================================================
// Authorization
// =============================================================================

/// The authenticated caller may not perform the action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("{action} on {resource_type} denied")]
    Denied {
        action: String,
        resource_type: String,
    },
}

// =============================================================================
// Validation
// =============================================================================

/// A single violated field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Every field that failed validation, not just the first one
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("validation failed on {} field(s)", .fields.len())]
pub struct ValidationError {
    pub fields: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldViolation::new(field, reason)],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.fields.push(FieldViolation::new(field, reason));
    }

    /// Append violations from another error, skipping exact duplicates
    pub fn merge(&mut self, other: ValidationError) {
        for violation in other.fields {
            if !self.fields.contains(&violation) {
                self.fields.push(violation);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(())` when nothing was collected
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|v| v.field == field)
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut out = ValidationError::new();
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        for (field, errs) in fields {
            for err in errs.iter() {
                let reason = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("failed '{}' check", err.code));
                out.push(field.to_string(), reason);
            }
        }
        out
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Typed outcome of a repository operation
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{resource_type} with id '{id}' not found")]
    NotFound { resource_type: String, id: Uuid },

    #[error("{resource_type} '{id}' is at version {actual}, expected {expected}")]
    Conflict {
        resource_type: String,
        id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage failure: {0}")]
    Internal(#[from] anyhow::Error),
}

// =============================================================================
// Configuration
// =============================================================================

/// Errors raised while loading or validating the security configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// ApiError
// =============================================================================

/// Transport-independent kind of an [`ApiError`], as exposed in envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    AuthError,
    AuthorizationError,
    ValidationError,
    NotFound,
    Conflict,
    Timeout,
    InternalError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::AuthError,
        ErrorKind::AuthorizationError,
        ErrorKind::ValidationError,
        ErrorKind::NotFound,
        ErrorKind::Conflict,
        ErrorKind::Timeout,
        ErrorKind::InternalError,
    ];

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::AuthError => StatusCode::UNAUTHORIZED,
            ErrorKind::AuthorizationError => StatusCode::FORBIDDEN,
            ErrorKind::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The error surfaced to callers of any gatehouse operation
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{resource_type} '{id}' not found")]
    NotFound { resource_type: String, id: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("operation deadline exceeded")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn not_found(resource_type: impl Into<String>, id: impl ToString) -> Self {
        ApiError::NotFound {
            resource_type: resource_type.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal(err.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Auth(_) => ErrorKind::AuthError,
            ApiError::Authorization(_) => ErrorKind::AuthorizationError,
            ApiError::Validation(_) => ErrorKind::ValidationError,
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::Conflict { .. } => ErrorKind::Conflict,
            ApiError::Timeout => ErrorKind::Timeout,
            ApiError::Internal(_) => ErrorKind::InternalError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Auth(e) => e.error_code(),
            ApiError::Authorization(_) => "ACCESS_DENIED",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::Timeout => "TIMEOUT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the caller; internal details never leave the process
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn fields(&self) -> Option<&[FieldViolation]> {
        match self {
            ApiError::Validation(v) => Some(&v.fields),
            _ => None,
        }
    }

    /// Log internal failures with their full chain before they are flattened
    pub fn log_if_internal(&self, context: &str) {
        if let ApiError::Internal(err) = self {
            tracing::error!(context = context, error = ?err, "internal failure");
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { resource_type, id } => ApiError::not_found(resource_type, id),
            e @ RepositoryError::Conflict { .. } => ApiError::conflict(e.to_string()),
            RepositoryError::Validation(v) => ApiError::Validation(v),
            RepositoryError::Internal(e) => ApiError::Internal(e),
        }
    }
}

/// JSON body used by the REST binding for auth routes
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldViolation>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_if_internal("http");
        let body = ErrorResponse {
            code: self.error_code().to_string(),
            kind: self.kind(),
            message: self.public_message(),
            fields: self.fields().map(|f| f.to_vec()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
