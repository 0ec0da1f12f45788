//! Data models
//!
//! Records are schema-less: every table shares the three lifecycle
//! fields and carries the rest as dynamic JSON fields.
//! Local IDs use ULID and timestamps use chrono.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Partial record: field name -> value
pub type Fields = Map<String, Value>;

/// Well-known table names
pub mod tables {
    pub const PLAYERS: &str = "players";
    pub const PROFILES: &str = "profiles";
    pub const VOTES: &str = "votes";
    pub const FAVORITES: &str = "favorites";
    pub const MESSAGES: &str = "messages";
    pub const GROUPS: &str = "groups";
}

/// Fields the data layer owns; callers may not set them directly.
pub const RESERVED_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Used for records created while the remote is unavailable, so they
/// cannot collide with remote-assigned IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Record
// =============================================================================

/// One row of a table
///
/// Serialized flat: `{"id": .., "created_at": .., "updated_at": .., <fields>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Build a record that has never been seen by the remote
    pub fn new_local(mut fields: Fields, now: DateTime<Utc>) -> Self {
        strip_reserved(&mut fields);
        Self {
            id: EntityId::new().0,
            created_at: now,
            updated_at: now,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Look up a field, including the lifecycle fields
    pub fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.id.clone())),
            "created_at" => Some(Value::String(sortable_timestamp(&self.created_at))),
            "updated_at" => Some(Value::String(sortable_timestamp(&self.updated_at))),
            other => self.fields.get(other).cloned(),
        }
    }

    /// Merge `fields` into this record and refresh `updated_at`.
    ///
    /// `id` and `created_at` never change; `updated_at` never moves backwards.
    pub fn merge(&mut self, mut fields: Fields, now: DateTime<Utc>) {
        strip_reserved(&mut fields);
        for (key, value) in fields {
            self.fields.insert(key, value);
        }
        self.updated_at = now.max(self.updated_at);
    }
}

/// Fixed-width RFC 3339 so lexical order equals chronological order
fn sortable_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn strip_reserved(fields: &mut Fields) {
    for reserved in RESERVED_FIELDS {
        fields.remove(reserved);
    }
}

/// Remote tables may use integer primary keys; expose every id as a string.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "record id must be a string or number, got {other}"
        ))),
    }
}

/// Reject table names that are empty or could escape a cache key / URL path
pub fn validate_table_name(table: &str) -> Result<(), AppError> {
    if table.is_empty() {
        return Err(AppError::Validation("table name must not be empty".to_string()));
    }
    let valid = table
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(AppError::Validation(format!(
            "invalid table name '{table}': use lowercase letters, digits and '_'"
        )));
    }
    Ok(())
}

// =============================================================================
// Queries
// =============================================================================

/// Sort order for `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Filter / order / limit for `list`
///
/// Filter conditions are exact matches and are ANDed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Fields,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when the query asks for the whole table
    pub fn is_full_scan(&self) -> bool {
        self.filter.is_empty() && self.limit.is_none()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filter
            .iter()
            .all(|(field, expected)| match record.field_value(field) {
                Some(actual) => values_match(&actual, expected),
                None => expected.is_null(),
            })
    }

    /// Apply filter, order and limit to an in-memory table.
    pub fn apply(&self, records: Vec<Record>) -> Page {
        let mut matched: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();

        if let Some(order) = &self.order_by {
            matched.sort_by(|a, b| {
                let ordering = compare_values(
                    a.field_value(&order.column).as_ref(),
                    b.field_value(&order.column).as_ref(),
                );
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let total_count = matched.len();
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        Page {
            records: matched,
            total_count,
        }
    }
}

/// Exact match, except that a string filter (as sent in a query string)
/// also matches a number or bool with the same text, as the remote does.
fn values_match(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(_) | Value::Bool(_), Value::String(text)) => actual.to_string() == *text,
        _ => false,
    }
}

/// Missing values sort first; numbers compare numerically, strings lexically.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// A page of `list` results
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub records: Vec<Record>,
    /// Number of matching rows before `limit` was applied
    pub total_count: usize,
}

// =============================================================================
// Results
// =============================================================================

/// Where a result came from
///
/// `Degraded` means the remote was unconfigured, marked unhealthy or
/// failed at the transport level, and the local cache answered instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Fresh(T),
    Degraded(T),
}

impl<T> Fetched<T> {
    /// Wrap `value`, degraded if any contributing step was
    pub fn from_parts(value: T, degraded: bool) -> Self {
        if degraded {
            Fetched::Degraded(value)
        } else {
            Fetched::Fresh(value)
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Fetched::Degraded(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Fetched::Fresh(value) | Fetched::Degraded(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Fetched::Fresh(value) | Fetched::Degraded(value) => value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Fresh(value) => Fetched::Fresh(f(value)),
            Fetched::Degraded(value) => Fetched::Degraded(f(value)),
        }
    }
}

// =============================================================================
// Change notifications
// =============================================================================

/// Row-level change kind pushed by the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change on a remote table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// New row for inserts and updates
    #[serde(default)]
    pub record: Option<Record>,
    /// Removed row id for deletes
    #[serde(default)]
    pub old_id: Option<String>,
}

impl ChangeEvent {
    /// Id of the affected row
    pub fn record_id(&self) -> Option<&str> {
        self.record
            .as_ref()
            .map(|r| r.id.as_str())
            .or(self.old_id.as_deref())
    }
}
