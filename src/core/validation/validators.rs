//! Reusable field validators
//!
//! These validators are attached to [`FieldSchema`](super::schema::FieldSchema)
//! entries. Each one only judges values of the type it understands and lets
//! everything else through; type mismatches are reported by the schema itself.

use regex::Regex;
use serde_json::Value;

/// Validator: field must not be null
pub fn required() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |_: &str, value: &Value| {
        if value.is_null() {
            Err("is required".to_string())
        } else {
            Ok(())
        }
    }
}

/// Validator: number must be positive
pub fn positive() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |_: &str, value: &Value| match value.as_f64() {
        Some(num) if num <= 0.0 => Err(format!("must be positive (got {})", num)),
        _ => Ok(()),
    }
}

/// Validator: string length (in characters) must be within range
pub fn string_length(
    min: usize,
    max: usize,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |_: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        let len = s.chars().count();
        if len < min {
            Err(format!("must be at least {} characters (got {})", min, len))
        } else if len > max {
            Err(format!("must be at most {} characters (got {})", max, len))
        } else {
            Ok(())
        }
    }
}

/// Validator: number must not be below minimum
pub fn min_value(min: f64) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |_: &str, value: &Value| match value.as_f64() {
        Some(num) if num < min => Err(format!("must be at least {} (got {})", min, num)),
        _ => Ok(()),
    }
}

/// Validator: number must not exceed maximum
pub fn max_value(max: f64) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |_: &str, value: &Value| match value.as_f64() {
        Some(num) if num > max => Err(format!("must not exceed {} (got {})", max, num)),
        _ => Ok(()),
    }
}

/// Validator: array must not hold more than `max` items
pub fn max_items(max: usize) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |_: &str, value: &Value| match value.as_array() {
        Some(items) if items.len() > max => Err(format!(
            "must hold at most {} items (got {})",
            max,
            items.len()
        )),
        _ => Ok(()),
    }
}

/// Validator: value must be in allowed list
pub fn in_list(
    allowed: Vec<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |_: &str, value: &Value| match value.as_str() {
        Some(s) if !allowed.iter().any(|a| a == s) => {
            Err(format!("must be one of {:?} (got '{}')", allowed, s))
        }
        _ => Ok(()),
    }
}

/// Validator: date must match format
pub fn date_format(
    format: &'static str,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |_: &str, value: &Value| match value.as_str() {
        Some(s) if chrono::NaiveDate::parse_from_str(s, format).is_err() => {
            Err(format!("must use the {} format (got '{}')", format, s))
        }
        _ => Ok(()),
    }
}

/// Validator: string must match a regular expression
///
/// # Panics
///
/// At construction, if `pattern` is not a valid regex.
pub fn pattern(
    pattern: &str,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    let re = Regex::new(pattern).unwrap_or_else(|e| panic!("invalid pattern '{}': {}", pattern, e));
    move |_: &str, value: &Value| match value.as_str() {
        Some(s) if !re.is_match(s) => Err(format!("must match {}", re.as_str())),
        _ => Ok(()),
    }
}
