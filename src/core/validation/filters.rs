//! Normalizing filters
//!
//! Filters rewrite a field value before validators run, so that `"  x "` and
//! `"x"` are stored and validated the same way. Values of a type a filter does
//! not handle pass through untouched.

use serde_json::{Value, json};

/// Filter: trim whitespace from string
pub fn trim() -> impl Fn(Value) -> Value + Send + Sync + Clone {
    |value: Value| match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other,
    }
}

/// Filter: convert string to lowercase
pub fn lowercase() -> impl Fn(Value) -> Value + Send + Sync + Clone {
    |value: Value| match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other,
    }
}

/// Filter: turn an empty (or whitespace-only) string into null
pub fn empty_as_null() -> impl Fn(Value) -> Value + Send + Sync + Clone {
    |value: Value| match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        other => other,
    }
}

/// Filter: drop repeated strings from an array, keeping first occurrences
pub fn dedupe_strings() -> impl Fn(Value) -> Value + Send + Sync + Clone {
    |value: Value| match value {
        Value::Array(items) => {
            let mut seen: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !item.is_string() || !seen.contains(&item) {
                    seen.push(item);
                }
            }
            Value::Array(seen)
        }
        other => other,
    }
}

/// Filter: round number to specified decimal places
pub fn round_decimals(decimals: u32) -> impl Fn(Value) -> Value + Send + Sync + Clone {
    move |value: Value| match value.as_f64() {
        Some(num) if value.is_f64() => {
            let factor = 10_f64.powi(decimals as i32);
            json!((num * factor).round() / factor)
        }
        _ => value,
    }
}
