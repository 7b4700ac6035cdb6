//! Resource abstraction shared by every CRUD collection
//!
//! A [`Resource`] wraps a typed payload with the metadata the engine manages
//! itself: identity, ownership, the optimistic-concurrency version and
//! timestamps. Payload types describe their own shape through
//! [`ResourcePayload`], so one repository contract serves every collection.

use crate::core::error::ValidationError;
use crate::core::validation::{PayloadSchema, ValidationMode};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

/// A payload type that can be stored as a resource.
///
/// Implementors provide the collection name and a [`PayloadSchema`]; semantic
/// rules that need typed access go in `#[derive(Validate)]` attributes.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
/// struct Note {
///     #[validate(length(min = 1, max = 120))]
///     name: String,
/// }
///
/// impl ResourcePayload for Note {
///     fn resource_type() -> &'static str { "note" }
///     fn schema() -> PayloadSchema {
///         PayloadSchema::new("note").field(FieldSchema::string("name").required())
///     }
/// }
/// ```
pub trait ResourcePayload:
    Serialize + DeserializeOwned + Validate + Clone + Send + Sync + 'static
{
    /// Collection name used in envelopes and URLs (e.g. "note")
    fn resource_type() -> &'static str;

    /// JSON shape of the payload
    fn schema() -> PayloadSchema;

    /// Validate a JSON document and turn it into the typed payload
    ///
    /// Schema violations and `#[validate]` violations are reported together
    /// whenever the document still deserializes.
    fn from_document(document: Value, mode: ValidationMode) -> Result<Self, ValidationError> {
        let (normalized, mut errors) = Self::schema().normalize(document, mode);
        let Some(normalized) = normalized else {
            return Err(errors);
        };

        match serde_json::from_value::<Self>(normalized) {
            Ok(payload) => {
                merge_derive_rules(&payload, &mut errors);
                errors.into_result()?;
                Ok(payload)
            }
            Err(e) => {
                if errors.is_empty() {
                    errors.push("payload", e.to_string());
                }
                Err(errors)
            }
        }
    }

    /// Full validation of an already typed payload
    fn check(&self) -> Result<(), ValidationError> {
        let document = serde_json::to_value(self)
            .map_err(|e| ValidationError::single("payload", e.to_string()))?;
        let (_, mut errors) = Self::schema().normalize(document, ValidationMode::Full);
        merge_derive_rules(self, &mut errors);
        errors.into_result()
    }
}

/// Add `#[validate]` violations for fields the schema did not already flag
fn merge_derive_rules<P: Validate>(payload: &P, errors: &mut ValidationError) {
    if let Err(derived) = payload.validate() {
        for violation in ValidationError::from(derived).fields {
            if !errors.has_field(&violation.field) {
                errors.fields.push(violation);
            }
        }
    }
}

/// A stored resource with its engine-managed metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<P> {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Starts at 1 and increments on every successful mutation
    pub version: u64,
    pub payload: P,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<P: ResourcePayload> Resource<P> {
    /// A fresh resource at version 1
    pub fn new(owner_id: Uuid, payload: P, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            version: 1,
            payload,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn resource_type(&self) -> &'static str {
        P::resource_type()
    }

    /// Pagination key: (created_at, id)
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }

    /// Serialize for the response envelope
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
