//! Authorization evaluation for gatehouse
//!
//! Decides whether a verified identity may perform an action on a resource.
//! Pure decision logic, no I/O:
//! - Unconditional grants (`read`)
//! - Owner-scoped grants (`read:own`)
//! - Negative grants (`!delete`), which always win
//! - Wildcard (`*`, `*:own`, `!*`)
//!
//! Anything not explicitly granted is denied, and so is anything the evaluator
//! cannot make sense of (unknown action, unknown role, malformed grant).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Data operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::List => "list",
        }
    }

    /// Whether the action addresses one existing resource
    pub fn targets_instance(&self) -> bool {
        matches!(self, Action::Read | Action::Update | Action::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "read" | "get" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "list" => Ok(Action::List),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// Whether a grant allows or forbids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// Which resources a grant applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Any resource
    Any,
    /// Only resources owned by the subject
    Own,
}

/// A parsed entry of the role-grant table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub effect: Effect,
    /// `None` for the `*` wildcard
    pub action: Option<Action>,
    pub scope: Scope,
}

impl Grant {
    /// Parse a grant string (for YAML config)
    ///
    /// Accepted forms: `read`, `read:own`, `!read`, `!read:own`, `*`, `*:own`, `!*`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        let (effect, rest) = match s.strip_prefix('!') {
            Some(rest) => (Effect::Deny, rest),
            None => (Effect::Allow, s),
        };

        let (action_part, scope) = match rest.split_once(':') {
            Some((action, "own")) => (action, Scope::Own),
            Some((_, qualifier)) => return Err(format!("unknown grant qualifier '{}'", qualifier)),
            None => (rest, Scope::Any),
        };

        let action = match action_part {
            "*" => None,
            other => Some(other.parse::<Action>()?),
        };

        Ok(Self {
            effect,
            action,
            scope,
        })
    }

    fn covers(&self, action: Action) -> bool {
        self.action.is_none_or(|a| a == action)
    }

    /// Whether this grant speaks to (action, ownership)
    fn applies(&self, action: Action, is_owner: bool) -> bool {
        self.covers(action) && (self.scope == Scope::Any || is_owner)
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Role name to grant strings, as loaded from configuration
///
/// Grants are kept raw so that a malformed entry denies at evaluation time
/// instead of being silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleGrants(HashMap<String, Vec<String>>);

impl RoleGrants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style role definition
    pub fn with_role<I, S>(mut self, role: &str, grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(role.to_string(), grants.into_iter().map(Into::into).collect());
        self
    }

    pub fn contains_role(&self, role: &str) -> bool {
        self.0.contains_key(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    /// Parse every grant of a role; any malformed entry fails the whole role
    pub fn grants_for(&self, role: &str) -> Option<Result<Vec<Grant>, String>> {
        self.0
            .get(role)
            .map(|raw| raw.iter().map(|g| Grant::parse(g)).collect())
    }

    /// First malformed grant found, as `(role, error)`
    pub fn first_malformed(&self) -> Option<(String, String)> {
        let mut roles: Vec<_> = self.0.keys().collect();
        roles.sort();
        roles.into_iter().find_map(|role| match self.grants_for(role) {
            Some(Err(e)) => Some((role.clone(), e)),
            _ => None,
        })
    }
}

/// Evaluates role grants for an (identity, action, owner) triple
#[derive(Debug, Clone)]
pub struct AuthorizationEvaluator {
    grants: RoleGrants,
}

impl AuthorizationEvaluator {
    pub fn new(grants: RoleGrants) -> Self {
        Self { grants }
    }

    pub fn grants(&self) -> &RoleGrants {
        &self.grants
    }

    /// Decide whether `subject`, holding `roles`, may perform `action`
    ///
    /// `owner` is the owner of the targeted resource, or `None` when the action
    /// addresses the collection (create, list).
    pub fn evaluate(
        &self,
        roles: &BTreeSet<String>,
        subject: Uuid,
        action: Action,
        owner: Option<Uuid>,
    ) -> Decision {
        let is_owner = owner == Some(subject);
        let mut allowed = false;

        for role in roles {
            let grants = match self.grants.grants_for(role) {
                Some(Ok(grants)) => grants,
                // Unknown role or malformed grant data
                Some(Err(_)) | None => return Decision::Deny,
            };

            for grant in grants.iter().filter(|g| g.applies(action, is_owner)) {
                match grant.effect {
                    Effect::Deny => return Decision::Deny,
                    Effect::Allow => allowed = true,
                }
            }
        }

        if allowed { Decision::Allow } else { Decision::Deny }
    }

    /// Same as [`evaluate`](Self::evaluate) with an action name that may not parse
    pub fn evaluate_named(
        &self,
        roles: &BTreeSet<String>,
        subject: Uuid,
        action: &str,
        owner: Option<Uuid>,
    ) -> Decision {
        match action.parse::<Action>() {
            Ok(action) => self.evaluate(roles, subject, action, owner),
            Err(_) => Decision::Deny,
        }
    }
}
