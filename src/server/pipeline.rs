//! Request pipeline: authenticate, authorize, validate, execute
//!
//! Every data operation goes through the same fixed sequence:
//!
//! 1. verify the bearer token as an access token
//! 2. resolve the action and the target (type, id, owner); reload the
//!    identity when the action needs fresh roles
//! 3. authorize
//! 4. validate the request
//! 5. call the repository
//! 6. build the response envelope
//!
//! A failing step short-circuits; later steps never run. Callers that cannot
//! authenticate therefore learn nothing about resources, and callers that are
//! not allowed learn nothing about payload rules.

use crate::auth::identity_store::IdentityStore;
use crate::auth::tokens::{Claims, TokenKind, TokenService};
use crate::config::SecurityConfig;
use crate::core::error::{ApiError, AuthError, AuthorizationError, ValidationError};
use crate::core::policy::{Action, AuthorizationEvaluator, Decision};
use crate::core::query::ListQuery;
use crate::server::envelope::{OperationRequest, OperationResponse};
use crate::server::registry::{ResourceHandler, ResourceRegistry};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Extract the token from an `Authorization: Bearer <token>` value
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let value = authorization.ok_or(AuthError::Invalid)?.trim();
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::Invalid)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Invalid);
    }
    Ok(token)
}

/// What the operation addresses, resolved in step 2
struct Target {
    handler: Arc<dyn ResourceHandler>,
    /// Resource id and its owner (`None` owner when the resource is missing)
    instance: Option<(Uuid, Option<Uuid>)>,
}

/// Executes operation envelopes against the registered resources
pub struct RequestPipeline {
    config: Arc<SecurityConfig>,
    tokens: Arc<TokenService>,
    identities: Arc<dyn IdentityStore>,
    evaluator: AuthorizationEvaluator,
    registry: Arc<ResourceRegistry>,
}

impl RequestPipeline {
    pub fn new(
        config: Arc<SecurityConfig>,
        tokens: Arc<TokenService>,
        identities: Arc<dyn IdentityStore>,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        let evaluator = AuthorizationEvaluator::new(config.role_grants.clone());
        Self {
            config,
            tokens,
            identities,
            evaluator,
            registry,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Run one operation and wrap the outcome in an envelope
    pub async fn execute(&self, request: OperationRequest) -> OperationResponse {
        match self.run(request).await {
            Ok(data) => OperationResponse::ok(data),
            Err(err) => {
                err.log_if_internal("pipeline");
                OperationResponse::from_error(&err)
            }
        }
    }

    /// Same as [`execute`](Self::execute), keeping the typed error
    pub async fn run(&self, request: OperationRequest) -> Result<Option<Value>, ApiError> {
        let started = Instant::now();

        // 1. authentication
        let token = bearer_token(request.authorization.as_deref())?;
        let claims = self.tokens.verify(token, TokenKind::Access).await?;
        let subject = claims.sub;

        // 2. action, target, roles
        let Ok(action) = request.action.parse::<Action>() else {
            tracing::warn!(subject = %subject, action = %request.action, "unknown action denied");
            return Err(AuthorizationError::Denied {
                action: request.action.clone(),
                resource_type: request.resource_type.clone(),
            }
            .into());
        };
        let target = self.resolve_target(action, &request).await?;
        let roles = self.roles_for(action, &claims).await?;

        // 3. authorization
        let scoped_owner = self.authorize(&roles, subject, action, &target, &request)?;

        // 4. validation
        let prepared = self.validate(action, &target, request, scoped_owner)?;

        // 5. repository
        if started.elapsed() > self.config.operation_timeout() {
            tracing::warn!(subject = %subject, action = %action, "operation deadline exceeded");
            return Err(ApiError::Timeout);
        }
        let data = self.dispatch(subject, &target, prepared).await?;

        tracing::debug!(
            subject = %subject,
            action = %action,
            resource_type = %target.handler.resource_type(),
            "operation completed"
        );
        Ok(data)
    }

    async fn resolve_target(
        &self,
        action: Action,
        request: &OperationRequest,
    ) -> Result<Target, ApiError> {
        let handler = self
            .registry
            .get(&request.resource_type)
            .ok_or_else(|| ApiError::not_found("resource type", &request.resource_type))?;

        let instance = if action.targets_instance() {
            let id = parse_resource_id(request.resource_id.as_deref())?;
            let owner = handler.owner_of(&id).await?;
            Some((id, owner))
        } else {
            None
        };

        Ok(Target { handler, instance })
    }

    /// Roles to authorize with: the token snapshot, or the stored roles for
    /// fresh-check actions
    async fn roles_for(
        &self,
        action: Action,
        claims: &Claims,
    ) -> Result<BTreeSet<String>, ApiError> {
        if !self.config.requires_fresh_check(action) {
            return Ok(claims.roles.clone());
        }
        match self.identities.get(&claims.sub).await? {
            Some(identity) if identity.is_active() => Ok(identity.roles),
            _ => {
                tracing::warn!(
                    subject = %claims.sub,
                    "fresh check failed for missing or suspended identity"
                );
                Err(AuthError::Revoked.into())
            }
        }
    }

    /// Returns the owner a `list` must be restricted to, if any
    fn authorize(
        &self,
        roles: &BTreeSet<String>,
        subject: Uuid,
        action: Action,
        target: &Target,
        request: &OperationRequest,
    ) -> Result<Option<Uuid>, ApiError> {
        let resource_type = target.handler.resource_type();
        let (decision, scoped_owner) = match action {
            // A resource that does not exist yet has no owner
            Action::Create => (self.evaluator.evaluate(roles, subject, action, None), None),
            Action::List => {
                let requested_owner = request
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("ownerId"))
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok());
                match self.evaluator.evaluate(roles, subject, action, requested_owner) {
                    Decision::Allow => (Decision::Allow, None),
                    Decision::Deny if requested_owner.is_none() => {
                        // list:own without an owner filter reads the caller's own rows
                        let own = self.evaluator.evaluate(roles, subject, action, Some(subject));
                        (own, Some(subject))
                    }
                    Decision::Deny => (Decision::Deny, None),
                }
            }
            _ => {
                // A missing resource is judged as the caller's own
                let owner = target
                    .instance
                    .and_then(|(_, owner)| owner)
                    .unwrap_or(subject);
                (
                    self.evaluator.evaluate(roles, subject, action, Some(owner)),
                    None,
                )
            }
        };

        if !decision.is_allowed() {
            tracing::warn!(
                subject = %subject,
                action = %action,
                resource_type = %resource_type,
                "access denied"
            );
            return Err(AuthorizationError::Denied {
                action: action.to_string(),
                resource_type: resource_type.to_string(),
            }
            .into());
        }

        tracing::debug!(
            subject = %subject,
            action = %action,
            resource_type = %resource_type,
            "access granted"
        );
        Ok(scoped_owner)
    }

    fn validate(
        &self,
        action: Action,
        target: &Target,
        request: OperationRequest,
        scoped_owner: Option<Uuid>,
    ) -> Result<Prepared, ValidationError> {
        let handler = &target.handler;
        match action {
            Action::Create => {
                let payload = request
                    .payload
                    .ok_or_else(|| ValidationError::single("payload", "is required"))?;
                Ok(Prepared::Create(handler.validate_create(payload)?))
            }
            Action::Read => Ok(Prepared::Read),
            Action::Update => {
                let mut errors = ValidationError::new();
                if request.if_version.is_none() {
                    errors.push("ifVersion", "is required");
                }
                let patch = match request.payload {
                    None => {
                        errors.push("payload", "is required");
                        None
                    }
                    Some(patch) => match handler.validate_patch(patch) {
                        Ok(patch) => Some(patch),
                        Err(e) => {
                            errors.merge(e);
                            None
                        }
                    },
                };
                match (request.if_version, patch) {
                    (Some(version), Some(patch)) if errors.is_empty() => {
                        Ok(Prepared::Update { version, patch })
                    }
                    _ => Err(errors),
                }
            }
            Action::Delete => request
                .if_version
                .map(|version| Prepared::Delete { version })
                .ok_or_else(|| ValidationError::single("ifVersion", "is required")),
            Action::List => {
                let mut query: ListQuery = match request.payload {
                    None | Some(Value::Null) => ListQuery::default(),
                    Some(params) => serde_json::from_value(params)
                        .map_err(|e| ValidationError::single("payload", e.to_string()))?,
                };
                query.validate()?;
                if scoped_owner.is_some() {
                    query.owner_id = scoped_owner;
                }
                Ok(Prepared::List(query))
            }
        }
    }

    async fn dispatch(
        &self,
        subject: Uuid,
        target: &Target,
        prepared: Prepared,
    ) -> Result<Option<Value>, ApiError> {
        let handler = &target.handler;
        let id = target.instance.map(|(id, _)| id);
        let require_id = || id.ok_or_else(|| ValidationError::single("resourceId", "is required"));

        match prepared {
            Prepared::Create(payload) => Ok(Some(handler.create(subject, payload).await?)),
            Prepared::Read => Ok(Some(handler.get(&require_id()?).await?)),
            Prepared::List(query) => Ok(Some(handler.list(&query).await?)),
            Prepared::Update { version, patch } => {
                Ok(Some(handler.update(&require_id()?, version, &patch).await?))
            }
            Prepared::Delete { version } => {
                handler.delete(&require_id()?, version).await?;
                Ok(None)
            }
        }
    }
}

/// A validated request, ready for the repository
enum Prepared {
    Create(Value),
    Read,
    List(ListQuery),
    Update { version: u64, patch: Value },
    Delete { version: u64 },
}

fn parse_resource_id(raw: Option<&str>) -> Result<Uuid, ValidationError> {
    let raw = raw.ok_or_else(|| ValidationError::single("resourceId", "is required"))?;
    Uuid::parse_str(raw.trim())
        .map_err(|_| ValidationError::single("resourceId", "must be a UUID"))
}
