//! Shared test harness for repository and pipeline testing
//!
//! Provides `Note`, a payload type exercising required and optional fields,
//! filters and validators, plus helpers for building test data.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//! use storage_harness::*;
//! ```

#![allow(dead_code)]

use gatehouse::core::resource::ResourcePayload;
use gatehouse::core::validation::{FieldSchema, PayloadSchema, filters, validators};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

#[macro_use]
pub mod repository_tests;
pub mod integration;

// ---------------------------------------------------------------------------
// Note: the payload every harness test stores
// ---------------------------------------------------------------------------

/// A test payload.
///
/// Fields:
/// - `name`: required string, trimmed, 1-80 characters
/// - `body`: optional string, removable through a `null` in a merge patch
/// - `priority`: integer in 0..=10 (used by comparison filters)
/// - `done`: boolean
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct Note {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub done: bool,
}

impl ResourcePayload for Note {
    fn resource_type() -> &'static str {
        "note"
    }

    fn schema() -> PayloadSchema {
        PayloadSchema::new("note")
            .field(
                FieldSchema::string("name")
                    .required()
                    .filter(filters::trim())
                    .validator(validators::string_length(1, 80)),
            )
            .field(FieldSchema::string("body").validator(validators::string_length(0, 2000)))
            .field(
                FieldSchema::integer("priority")
                    .validator(validators::min_value(0.0))
                    .validator(validators::max_value(10.0)),
            )
            .field(FieldSchema::boolean("done"))
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// A `Note` with the given name and defaults elsewhere
pub fn note(name: &str) -> Note {
    Note {
        name: name.to_string(),
        body: None,
        priority: 0,
        done: false,
    }
}

pub fn note_with_priority(name: &str, priority: i64) -> Note {
    Note {
        priority,
        ..note(name)
    }
}

/// Generate `n` notes with varied priority and completion
pub fn sample_batch(n: usize) -> Vec<Note> {
    (0..n)
        .map(|i| Note {
            name: format!("note-{:03}", i),
            body: (i % 2 == 0).then(|| format!("body {}", i)),
            priority: (i % 11) as i64,
            done: i % 3 == 0,
        })
        .collect()
}

/// JSON payload form of a note
pub fn note_json(name: &str) -> Value {
    json!({ "name": name })
}
