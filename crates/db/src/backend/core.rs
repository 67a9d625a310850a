//! Core Backend Traits
//!
//! This module defines the traits and types the connection manager uses to
//! talk to a database. The traits abstract away driver-specific details so the
//! manager can run against the production Postgres backend or a scripted test
//! backend through the same interface.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::config::ManagerConfig;

/// Structural classification of a backend failure.
///
/// The manager decides whether to retry from this kind alone; it never
/// inspects error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An attempt exceeded its time budget
    Timeout,
    /// The peer closed or reset the connection mid-operation
    ConnectionReset,
    /// Transient network or server-availability failure
    Network,
    /// The query text was rejected by the server
    Syntax,
    /// A constraint (unique, foreign key, not-null) was violated
    ConstraintViolation,
    /// Authentication or authorization failure
    PermissionDenied,
    /// The handle configuration is unusable (bad URL, missing driver support)
    Configuration,
    /// The handle was closed before or during the operation
    Closed,
    /// Anything the adapter could not classify
    Other,
}

impl ErrorKind {
    /// Whether a failure of this kind is worth retrying on the same handle
    /// or a fresh one.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::ConnectionReset | ErrorKind::Network
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionReset => "connection reset",
            ErrorKind::Network => "network",
            ErrorKind::Syntax => "syntax",
            ErrorKind::ConstraintViolation => "constraint violation",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Closed => "closed",
            ErrorKind::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// A failure reported by a backend adapter, tagged with its structural kind.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Factory for backend handles.
///
/// One `connect` call produces one live handle; the manager owns it
/// exclusively and decides when to replace it.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Acquire a fresh handle to the database at `url`.
    async fn connect(
        &self,
        url: &str,
        config: &ManagerConfig,
    ) -> Result<Arc<dyn BackendHandle>, BackendError>;
}

/// A live handle to the database.
#[async_trait]
pub trait BackendHandle: Send + Sync {
    /// Execute a query and return all result rows.
    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, BackendError>;

    /// Issue the trivial liveness probe.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Release the handle's resources. Best-effort.
    async fn close(&self);
}

/// Value enumeration for type-safe parameter binding and row decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Json(JsonValue),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::Int(i) => JsonValue::Number(serde_json::Number::from(*i)),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::Text(s) => JsonValue::String(s.clone()),
            SqlValue::Uuid(u) => JsonValue::String(u.to_string()),
            SqlValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            SqlValue::Json(j) => j.clone(),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<uuid::Uuid> for SqlValue {
    fn from(value: uuid::Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for SqlValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        SqlValue::DateTime(value)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        SqlValue::Json(value)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// One result row: column names in select order plus a name-to-value map.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: HashMap<String, SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: HashMap<String, SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Get a column value by name.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    /// Column names in the order the query produced them.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Convert the row to a JSON object keyed by column name.
    pub fn to_json(&self) -> JsonValue {
        let mut map = serde_json::Map::with_capacity(self.columns.len());
        for name in &self.columns {
            let value = self
                .values
                .get(name)
                .map(SqlValue::to_json)
                .unwrap_or(JsonValue::Null);
            map.insert(name.clone(), value);
        }
        JsonValue::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::ConnectionReset.is_retryable());
        assert!(ErrorKind::Network.is_retryable());

        assert!(!ErrorKind::Syntax.is_retryable());
        assert!(!ErrorKind::ConstraintViolation.is_retryable());
        assert!(!ErrorKind::PermissionDenied.is_retryable());
        assert!(!ErrorKind::Configuration.is_retryable());
        assert!(!ErrorKind::Closed.is_retryable());
        assert!(!ErrorKind::Other.is_retryable());
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new(ErrorKind::PermissionDenied, "password authentication failed");
        assert_eq!(
            err.to_string(),
            "permission denied: password authentication failed"
        );
        assert!(!err.is_retryable());

        let err = BackendError::timeout("attempt exceeded 30000ms");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_sql_value_conversions() {
        assert_eq!(SqlValue::from(42i64), SqlValue::Int(42));
        assert_eq!(SqlValue::from(7i32), SqlValue::Int(7));
        assert_eq!(SqlValue::from(true), SqlValue::Bool(true));
        assert_eq!(SqlValue::from("hello"), SqlValue::Text("hello".to_string()));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3i64)), SqlValue::Int(3));
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::Bool(false).is_null());
    }

    #[test]
    fn test_sql_value_to_json() {
        assert_eq!(SqlValue::Int(5).to_json(), serde_json::json!(5));
        assert_eq!(SqlValue::Text("x".into()).to_json(), serde_json::json!("x"));
        assert_eq!(SqlValue::Null.to_json(), JsonValue::Null);
        assert_eq!(SqlValue::Float(1.5).to_json(), serde_json::json!(1.5));
    }

    #[test]
    fn test_row_access() {
        let mut values = HashMap::new();
        values.insert("id".to_string(), SqlValue::Int(1));
        values.insert("name".to_string(), SqlValue::Text("ada".to_string()));
        let row = Row::new(vec!["id".to_string(), "name".to_string()], values);

        assert_eq!(row.get("id"), Some(&SqlValue::Int(1)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.column_count(), 2);
        assert_eq!(row.column_names(), &["id".to_string(), "name".to_string()]);

        let json = row.to_json();
        assert_eq!(json["id"], serde_json::json!(1));
        assert_eq!(json["name"], serde_json::json!("ada"));
    }
}
