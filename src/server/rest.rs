//! REST exposure
//!
//! Maps the operation envelope and the authentication operations onto HTTP
//! routes. Error kinds become status codes; bodies stay JSON.

use super::host::ServerHost;
use crate::auth::credentials::{CredentialStore, NewIdentity};
use crate::auth::tokens::{Claims, TokenKind, TokenPair, TokenService};
use crate::core::error::{ApiError, ValidationError};
use crate::core::identity::{Identity, IdentityStatus};
use crate::server::contract::ApiContract;
use crate::server::envelope::{OperationRequest, OperationResponse};
use crate::server::pipeline::{RequestPipeline, bearer_token};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
    pub credentials: Arc<CredentialStore>,
    pub tokens: Arc<TokenService>,
    pub contract: Arc<ApiContract>,
}

impl AppState {
    pub fn from_host(host: &ServerHost) -> Self {
        Self {
            pipeline: host.pipeline.clone(),
            credentials: host.credentials.clone(),
            tokens: host.tokens.clone(),
            contract: host.contract.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Username or email
    pub identifier: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    pub old_secret: String,
    pub new_secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    #[serde(flatten)]
    pub identity: NewIdentity,
    pub roles: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: IdentityStatus,
}

#[derive(Debug, Deserialize)]
pub struct RolesRequest {
    pub roles: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequest {
    pub new_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailVerificationRequest {
    pub verified: bool,
}

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Router {
        let mut app = Self::health_routes().merge(Self::api_routes(AppState::from_host(&host)));

        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Routes of the operation envelope, the auth and admin surfaces and the
    /// contract
    pub fn api_routes(state: AppState) -> Router {
        Router::new()
            .route("/operations", post(execute_operation))
            .route("/auth/register", post(register))
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/auth/password", post(change_password))
            .route("/admin/identities", post(provision_identity))
            .route("/admin/identities/{id}", get(get_identity))
            .route("/admin/identities/{id}/status", post(set_identity_status))
            .route("/admin/identities/{id}/roles", post(set_identity_roles))
            .route("/admin/identities/{id}/password", post(reset_identity_secret))
            .route(
                "/admin/identities/{id}/email-verification",
                post(set_email_verification),
            )
            .route("/contract", get(contract))
            .with_state(state)
    }

    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "gatehouse"
        }))
    }
}

/// Unwrap a JSON body, turning extractor rejections into validation errors
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ValidationError::single("body", rejection.body_text()).into())
}

fn authorization_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn execute_operation(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<OperationRequest>, JsonRejection>,
) -> Response {
    let mut request = match body(payload) {
        Ok(request) => request,
        Err(err) => return OperationResponse::from_error(&err).into_response(),
    };
    if let Some(authorization) = authorization_header(&headers) {
        request.authorization = Some(authorization);
    }
    state.pipeline.execute(request).await.into_response()
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<NewIdentity>, JsonRejection>,
) -> Result<Response, ApiError> {
    let identity = state.credentials.register(body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(identity)).into_response())
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let request = body(payload)?;
    let pair = state
        .credentials
        .login(&request.identifier, &request.secret)
        .await?;
    Ok(Json(pair))
}

async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let request = body(payload)?;
    Ok(Json(state.tokens.refresh(&request.refresh_token).await?))
}

/// Revoke the bearer access token and, when given, the refresh token
///
/// The body is optional; a request without a JSON content type only revokes
/// the access token. A refresh token issued to someone else is refused before
/// anything is revoked.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let authorization = authorization_header(&headers);
    let access_token = bearer_token(authorization.as_deref())?;
    let claims = state.tokens.verify(access_token, TokenKind::Access).await?;

    let request = match payload {
        Err(JsonRejection::MissingJsonContentType(_)) => LogoutRequest::default(),
        other => body(other)?,
    };

    if let Some(refresh_token) = request.refresh_token {
        state
            .tokens
            .revoke_owned(&refresh_token, &claims.sub)
            .await?;
    }
    state.tokens.revoke(access_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PasswordChangeRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let authorization = authorization_header(&headers);
    let claims = state
        .tokens
        .verify(bearer_token(authorization.as_deref())?, TokenKind::Access)
        .await?;
    let request = body(payload)?;

    state
        .credentials
        .rotate_secret(&claims.sub, &request.old_secret, &request.new_secret)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Verify the bearer token and require an administrative role
async fn admin(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let authorization = authorization_header(headers);
    let claims = state
        .tokens
        .verify(bearer_token(authorization.as_deref())?, TokenKind::Access)
        .await?;
    state.credentials.require_admin(&claims).await?;
    Ok(claims)
}

fn identity_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ValidationError::single("id", "must be a UUID").into())
}

async fn provision_identity(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let claims = admin(&state, &headers).await?;
    let request = body(payload)?;
    let identity = state
        .credentials
        .provision(request.identity, request.roles)
        .await?;
    tracing::info!(admin = %claims.sub, subject = %identity.id, "identity provisioned");
    Ok((StatusCode::CREATED, Json(identity)).into_response())
}

async fn get_identity(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Identity>, ApiError> {
    admin(&state, &headers).await?;
    Ok(Json(state.credentials.get(&identity_id(path)?).await?))
}

async fn set_identity_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Identity>, ApiError> {
    let claims = admin(&state, &headers).await?;
    let id = identity_id(path)?;
    let request = body(payload)?;
    if id == claims.sub && request.status == IdentityStatus::Suspended {
        return Err(ValidationError::single("status", "cannot suspend yourself").into());
    }
    Ok(Json(state.credentials.set_status(&id, request.status).await?))
}

async fn set_identity_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RolesRequest>, JsonRejection>,
) -> Result<Json<Identity>, ApiError> {
    admin(&state, &headers).await?;
    let id = identity_id(path)?;
    let request = body(payload)?;
    Ok(Json(state.credentials.assign_roles(&id, request.roles).await?))
}

async fn reset_identity_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PasswordResetRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    admin(&state, &headers).await?;
    let id = identity_id(path)?;
    let request = body(payload)?;
    state.credentials.reset_secret(&id, &request.new_secret).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_email_verification(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<EmailVerificationRequest>, JsonRejection>,
) -> Result<Json<Identity>, ApiError> {
    admin(&state, &headers).await?;
    let id = identity_id(path)?;
    let request = body(payload)?;
    Ok(Json(state.credentials.set_email_verified(&id, request.verified).await?))
}

async fn contract(State(state): State<AppState>) -> Json<ApiContract> {
    Json(state.contract.as_ref().clone())
}
