//! Transport-neutral operation envelope

use crate::core::error::{ApiError, ErrorKind, FieldViolation};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One data operation as submitted by a caller
///
/// For `list`, `payload` carries the list parameters
/// (`ownerId`, `filter`, `cursor`, `limit`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    /// `Bearer <token>`
    #[serde(default)]
    pub authorization: Option<String>,
    pub action: String,
    pub resource_type: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub if_version: Option<u64>,
}

impl OperationRequest {
    pub fn new(action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    /// Set the authorization from a raw access token
    pub fn bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {}", token));
        self
    }

    pub fn id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn if_version(mut self, version: u64) -> Self {
        self.if_version = Some(version);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldViolation>>,
}

/// Uniform result of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl OperationResponse {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            data,
            error: None,
        }
    }

    pub fn from_error(err: &ApiError) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            error: Some(ErrorBody {
                kind: err.kind(),
                message: err.public_message(),
                fields: err.fields().map(|f| f.to_vec()),
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn status_code(&self) -> StatusCode {
        self.error_kind()
            .map(|kind| kind.status_code())
            .unwrap_or(StatusCode::OK)
    }
}

impl IntoResponse for OperationResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}
