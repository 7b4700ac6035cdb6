//! Listing parameters, keyset pagination and payload filters

use crate::core::error::ValidationError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Position after the last returned row: the (created_at, id) composite key.
///
/// Rows are ordered by that key, and new rows always sort after every existing
/// row, so a cursor never moves when concurrent inserts happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    pub fn key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}~{}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.id
        )
    }
}

impl FromStr for Cursor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts, id) = s.split_once('~').ok_or("malformed cursor")?;
        let created_at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| "malformed cursor timestamp")?
            .with_timezone(&Utc);
        let id = Uuid::parse_str(id).map_err(|_| "malformed cursor id")?;
        Ok(Self { created_at, id })
    }
}

impl Serialize for Cursor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which page to read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageRequest {
    /// Return rows strictly after this position
    pub cursor: Option<Cursor>,
    pub limit: Option<usize>,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            cursor: None,
            limit: Some(limit),
        }
    }

    pub fn after(cursor: Cursor, limit: usize) -> Self {
        Self {
            cursor: Some(cursor),
            limit: Some(limit),
        }
    }

    /// Get limit, clamped to 1..=MAX_LIMIT
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Parameters of a list operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    pub owner_id: Option<Uuid>,
    /// Filters as a JSON object
    ///
    /// # Format
    /// - Exact match: `{"field": "value"}`
    /// - Comparison: `{"field>": 1, "field<": 9, "field>=": 1, "field<=": 9}`
    pub filter: Option<Value>,
    #[serde(flatten)]
    pub page: PageRequest,
}

impl ListQuery {
    pub fn owned_by(owner_id: Uuid) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Reject filters the matcher cannot evaluate
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.filter {
            None => Ok(()),
            Some(Value::Object(map)) => {
                let mut errors = ValidationError::new();
                for (key, value) in map {
                    let (_, op) = split_operator(key);
                    if op != FilterOp::Eq && !value.is_number() {
                        errors.push(format!("filter.{}", key), "comparison needs a number");
                    }
                }
                errors.into_result()
            }
            Some(_) => Err(ValidationError::single("filter", "must be a JSON object")),
        }
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present when more rows existed after the last item at read time
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            next_cursor: self.next_cursor,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOp {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
}

fn split_operator(key: &str) -> (&str, FilterOp) {
    if let Some(field) = key.strip_suffix(">=") {
        (field, FilterOp::Gte)
    } else if let Some(field) = key.strip_suffix("<=") {
        (field, FilterOp::Lte)
    } else if let Some(field) = key.strip_suffix('>') {
        (field, FilterOp::Gt)
    } else if let Some(field) = key.strip_suffix('<') {
        (field, FilterOp::Lt)
    } else {
        (key, FilterOp::Eq)
    }
}

/// Whether a payload document satisfies every filter entry
pub fn matches_filter(document: &Value, filter: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        return false;
    };

    conditions.iter().all(|(key, expected)| {
        let (field, op) = split_operator(key);
        let Some(actual) = document.get(field) else {
            return false;
        };

        if op == FilterOp::Eq {
            return actual == expected;
        }

        let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) else {
            return false;
        };
        match a.partial_cmp(&b) {
            Some(Ordering::Greater) => matches!(op, FilterOp::Gt | FilterOp::Gte),
            Some(Ordering::Less) => matches!(op, FilterOp::Lt | FilterOp::Lte),
            Some(Ordering::Equal) => matches!(op, FilterOp::Gte | FilterOp::Lte),
            None => false,
        }
    })
}
