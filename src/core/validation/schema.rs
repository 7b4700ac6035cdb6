//! Declarative payload schemas
//!
//! A [`PayloadSchema`] describes the JSON shape of one resource kind. It serves
//! two purposes: validating request payloads (collecting every violation) and
//! exposing static metadata that a contract document generator can consume.

use crate::core::error::ValidationError;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;

type Validator = Arc<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;
type Filter = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// JSON type expected for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Uuid,
    DateTime,
}

impl FieldType {
    fn json_type(&self) -> &'static str {
        match self {
            FieldType::String | FieldType::Uuid | FieldType::DateTime => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        let ok = match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Uuid => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            FieldType::DateTime => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
        };

        if ok {
            Ok(())
        } else {
            Err(match self {
                FieldType::Uuid => "must be a UUID string".to_string(),
                FieldType::DateTime => "must be an RFC 3339 timestamp".to_string(),
                other => format!("must be of type {}", other.json_type()),
            })
        }
    }
}

/// How much of the schema applies to a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// A complete document: required fields must be present
    Full,
    /// A merge patch: only the present fields are checked, null clears optional fields
    Patch,
}

/// One field of a payload schema
#[derive(Clone)]
pub struct FieldSchema {
    name: String,
    field_type: FieldType,
    required: bool,
    description: Option<String>,
    filters: Vec<Filter>,
    validators: Vec<Validator>,
}

impl fmt::Debug for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSchema")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("required", &self.required)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl FieldSchema {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: false,
            description: None,
            filters: Vec::new(),
            validators: Vec::new(),
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn array(name: &str) -> Self {
        Self::new(name, FieldType::Array)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&str, &Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    fn apply_filters(&self, value: Value) -> Value {
        self.filters.iter().fold(value, |v, f| f(v))
    }

    /// Check one present value, pushing every problem found
    fn check(&self, value: &Value, errors: &mut ValidationError) {
        if let Err(reason) = self.field_type.check(value) {
            errors.push(self.name.as_str(), reason);
            return;
        }
        for validator in &self.validators {
            if let Err(reason) = validator(&self.name, value) {
                errors.push(self.name.as_str(), reason);
            }
        }
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = json!({ "type": self.field_type.json_type() });
        match self.field_type {
            FieldType::Uuid => schema["format"] = json!("uuid"),
            FieldType::DateTime => schema["format"] = json!("date-time"),
            _ => {}
        }
        if let Some(description) = &self.description {
            schema["description"] = json!(description);
        }
        schema
    }
}

/// Shape of a resource payload
#[derive(Debug, Clone)]
pub struct PayloadSchema {
    resource_type: String,
    fields: Vec<FieldSchema>,
}

impl PayloadSchema {
    pub fn new(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Filter then validate a payload, returning the normalized document
    ///
    /// All violations are collected: unknown fields, missing required fields
    /// (full mode), type mismatches and validator failures.
    pub fn validate_and_filter(
        &self,
        payload: Value,
        mode: ValidationMode,
    ) -> Result<Value, ValidationError> {
        match self.normalize(payload, mode) {
            (Some(document), errors) => errors.into_result().map(|_| document),
            (None, errors) => Err(errors),
        }
    }

    /// Filter a payload and collect its violations without failing
    ///
    /// The document keeps known fields only, offending values included, so
    /// later layers can still inspect it. `None` when the payload is not an
    /// object.
    pub fn normalize(
        &self,
        payload: Value,
        mode: ValidationMode,
    ) -> (Option<Value>, ValidationError) {
        let Value::Object(input) = payload else {
            return (
                None,
                ValidationError::single("payload", "must be a JSON object"),
            );
        };

        let mut errors = ValidationError::new();
        let mut output = Map::with_capacity(input.len());

        let mut unknown: Vec<&String> = input
            .keys()
            .filter(|k| !self.fields.iter().any(|f| &f.name == *k))
            .collect();
        unknown.sort();
        for key in unknown {
            errors.push(key.as_str(), "unknown field");
        }

        for field in &self.fields {
            match input.get(&field.name) {
                None if mode == ValidationMode::Full && field.required => {
                    errors.push(field.name.as_str(), "is required");
                }
                None => {}
                Some(Value::Null) if field.required => {
                    errors.push(field.name.as_str(), "is required");
                }
                Some(Value::Null) => {
                    output.insert(field.name.clone(), Value::Null);
                }
                Some(value) => {
                    let value = field.apply_filters(value.clone());
                    if value.is_null() {
                        if field.required {
                            errors.push(field.name.as_str(), "is required");
                        }
                    } else {
                        field.check(&value, &mut errors);
                    }
                    output.insert(field.name.clone(), value);
                }
            }
        }

        (Some(Value::Object(output)), errors)
    }

    /// JSON Schema fragment for document generators
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "title": self.resource_type,
            "type": "object",
            "additionalProperties": false,
            "properties": properties,
            "required": required,
        })
    }
}
