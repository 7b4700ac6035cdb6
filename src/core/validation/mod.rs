//! Validation and filtering system
//!
//! Payloads are filtered and validated against a declarative [`PayloadSchema`]
//! before they reach a repository, and typed payloads additionally run their
//! `validator` derive rules.

pub mod filters;
pub mod patch;
pub mod schema;
pub mod validators;

pub use patch::merge_patch;
pub use schema::{FieldSchema, FieldType, PayloadSchema, ValidationMode};
