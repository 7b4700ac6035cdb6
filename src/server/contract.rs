//! Static API metadata
//!
//! Describes every operation the service exposes so that document generators
//! (OpenAPI or otherwise) can be driven from the same registry the pipeline
//! dispatches on.

use crate::core::error::ErrorKind;
use crate::core::policy::Action;
use crate::server::registry::ResourceRegistry;
use serde::Serialize;
use serde_json::Value;

/// One resource operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    /// e.g. `update_note`
    pub name: String,
    pub action: Action,
    pub resource_type: String,
    /// Whether `ifVersion` must be supplied
    pub requires_version: bool,
    pub requires_resource_id: bool,
    pub accepts_payload: bool,
}

/// Operations and payload schema of one resource type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContract {
    pub resource_type: String,
    pub operations: Vec<OperationDescriptor>,
    pub payload_schema: Value,
}

/// HTTP route of the authentication surface
#[derive(Debug, Clone, Serialize)]
pub struct RouteDescriptor {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub status: u16,
}

/// The full metadata document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiContract {
    pub title: String,
    pub version: String,
    pub security_scheme: &'static str,
    pub resources: Vec<ResourceContract>,
    pub routes: Vec<RouteDescriptor>,
    pub errors: Vec<ErrorDescriptor>,
}

const ROUTES: [RouteDescriptor; 13] = [
    RouteDescriptor {
        method: "POST",
        path: "/operations",
        description: "Execute a resource operation envelope",
    },
    RouteDescriptor {
        method: "POST",
        path: "/auth/register",
        description: "Register a new identity",
    },
    RouteDescriptor {
        method: "POST",
        path: "/auth/login",
        description: "Exchange credentials for a token pair",
    },
    RouteDescriptor {
        method: "POST",
        path: "/auth/refresh",
        description: "Rotate a refresh token into a new pair",
    },
    RouteDescriptor {
        method: "POST",
        path: "/auth/logout",
        description: "Revoke the presented tokens",
    },
    RouteDescriptor {
        method: "POST",
        path: "/auth/password",
        description: "Rotate the caller's secret",
    },
    RouteDescriptor {
        method: "POST",
        path: "/admin/identities",
        description: "Provision an identity with explicit roles",
    },
    RouteDescriptor {
        method: "GET",
        path: "/admin/identities/{id}",
        description: "Read an identity",
    },
    RouteDescriptor {
        method: "POST",
        path: "/admin/identities/{id}/status",
        description: "Activate or suspend an identity",
    },
    RouteDescriptor {
        method: "POST",
        path: "/admin/identities/{id}/roles",
        description: "Replace the roles of an identity",
    },
    RouteDescriptor {
        method: "POST",
        path: "/admin/identities/{id}/password",
        description: "Reset a secret and revoke every token",
    },
    RouteDescriptor {
        method: "POST",
        path: "/admin/identities/{id}/email-verification",
        description: "Mark an email address as verified or not",
    },
    RouteDescriptor {
        method: "GET",
        path: "/contract",
        description: "This document",
    },
];

fn operation_name(action: Action, resource_type: &str) -> String {
    let verb = match action {
        Action::Read => "get",
        other => other.as_str(),
    };
    format!("{}_{}", verb, resource_type)
}

impl ApiContract {
    /// Build the document from the registered resource types
    pub fn from_registry(registry: &ResourceRegistry) -> Self {
        let resources = registry
            .handlers()
            .map(|handler| {
                let resource_type = handler.resource_type();
                let operations = Action::ALL
                    .iter()
                    .map(|&action| OperationDescriptor {
                        name: operation_name(action, resource_type),
                        action,
                        resource_type: resource_type.to_string(),
                        requires_version: matches!(action, Action::Update | Action::Delete),
                        requires_resource_id: action.targets_instance(),
                        accepts_payload: matches!(
                            action,
                            Action::Create | Action::Update | Action::List
                        ),
                    })
                    .collect();
                ResourceContract {
                    resource_type: resource_type.to_string(),
                    operations,
                    payload_schema: handler.schema().to_json_schema(),
                }
            })
            .collect();

        Self {
            title: "gatehouse".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            security_scheme: "bearer",
            resources,
            routes: ROUTES.to_vec(),
            errors: ErrorKind::ALL
                .iter()
                .map(|&kind| ErrorDescriptor {
                    kind,
                    status: kind.status_code().as_u16(),
                })
                .collect(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Find an operation by name, e.g. `delete_note`
    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.resources
            .iter()
            .flat_map(|r| r.operations.iter())
            .find(|op| op.name == name)
    }
}
