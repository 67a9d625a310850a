//! PostgreSQL Backend Implementation
//!
//! This module provides the PostgreSQL implementation of the backend traits
//! using sqlx as the underlying database driver. One `connect` call produces
//! one handle; the manager treats it as its single opaque connection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Column, Pool, Postgres, Row as SqlxRow, TypeInfo};

use super::core::{BackendError, BackendHandle, ErrorKind, QueryBackend, Row, SqlValue};
use crate::config::ManagerConfig;

/// PostgreSQL backend implementation
#[derive(Debug, Default)]
pub struct PostgresBackend;

impl PostgresBackend {
    /// Create a new PostgreSQL backend instance
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QueryBackend for PostgresBackend {
    async fn connect(
        &self,
        url: &str,
        config: &ManagerConfig,
    ) -> Result<Arc<dyn BackendHandle>, BackendError> {
        if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
            return Err(BackendError::new(
                ErrorKind::Configuration,
                "invalid PostgreSQL URL scheme",
            ));
        }

        // A single underlying connection; the manager owns exactly one handle.
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout())
            .connect(url)
            .await
            .map_err(classify_sqlx_error)?;

        Ok(Arc::new(PostgresHandle { pool }))
    }
}

/// A live PostgreSQL handle
pub struct PostgresHandle {
    pool: Pool<Postgres>,
}

#[async_trait]
impl BackendHandle for PostgresHandle {
    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, BackendError> {
        if self.pool.is_closed() {
            return Err(BackendError::new(ErrorKind::Closed, "handle is closed"));
        }

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sql_value(query, param);
        }

        let pg_rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            rows.push(decode_row(pg_row)?);
        }
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        if self.pool.is_closed() {
            return Err(BackendError::new(ErrorKind::Closed, "handle is closed"));
        }

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify_sqlx_error)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Bind a SqlValue to a sqlx query
fn bind_sql_value<'a>(
    query: sqlx::query::Query<'a, Postgres, sqlx::postgres::PgArguments>,
    value: &SqlValue,
) -> sqlx::query::Query<'a, Postgres, sqlx::postgres::PgArguments> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Uuid(u) => query.bind(*u),
        SqlValue::DateTime(dt) => query.bind(*dt),
        SqlValue::Json(j) => query.bind(j.clone()),
    }
}

fn decode_row(pg_row: &sqlx::postgres::PgRow) -> Result<Row, BackendError> {
    let columns: Vec<String> = pg_row
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();

    let mut values = HashMap::with_capacity(columns.len());
    for (index, name) in columns.iter().enumerate() {
        values.insert(name.clone(), decode_column(pg_row, index)?);
    }

    Ok(Row::new(columns, values))
}

/// Convert a PostgreSQL column value to SqlValue
fn decode_column(row: &sqlx::postgres::PgRow, index: usize) -> Result<SqlValue, BackendError> {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();

    let decode_err = |e: sqlx::Error| {
        BackendError::new(
            ErrorKind::Other,
            format!("failed to decode column '{}' ({}): {}", column.name(), type_name, e),
        )
    };

    match type_name {
        "BOOL" => {
            let value: Option<bool> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(SqlValue::Bool).unwrap_or(SqlValue::Null))
        }
        "INT2" => {
            let value: Option<i16> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(|v| SqlValue::Int(v as i64)).unwrap_or(SqlValue::Null))
        }
        "INT4" => {
            let value: Option<i32> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(|v| SqlValue::Int(v as i64)).unwrap_or(SqlValue::Null))
        }
        "INT8" => {
            let value: Option<i64> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(SqlValue::Int).unwrap_or(SqlValue::Null))
        }
        "FLOAT4" => {
            let value: Option<f32> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(|v| SqlValue::Float(v as f64)).unwrap_or(SqlValue::Null))
        }
        "FLOAT8" => {
            let value: Option<f64> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(SqlValue::Float).unwrap_or(SqlValue::Null))
        }
        "TEXT" | "VARCHAR" | "NAME" => {
            let value: Option<String> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(SqlValue::Text).unwrap_or(SqlValue::Null))
        }
        "UUID" => {
            let value: Option<uuid::Uuid> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(SqlValue::Uuid).unwrap_or(SqlValue::Null))
        }
        "TIMESTAMPTZ" | "TIMESTAMP" => {
            let value: Option<chrono::DateTime<chrono::Utc>> =
                row.try_get(index).map_err(decode_err)?;
            Ok(value.map(SqlValue::DateTime).unwrap_or(SqlValue::Null))
        }
        "JSON" | "JSONB" => {
            let value: Option<JsonValue> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(SqlValue::Json).unwrap_or(SqlValue::Null))
        }
        _ => {
            // Fallback: try to get as string
            let value: Option<String> = row.try_get(index).map_err(decode_err)?;
            Ok(value.map(SqlValue::Text).unwrap_or(SqlValue::Null))
        }
    }
}

/// Classify a sqlx error into the structural taxonomy.
pub(crate) fn classify_sqlx_error(error: sqlx::Error) -> BackendError {
    let kind = match &error {
        sqlx::Error::PoolTimedOut => ErrorKind::Timeout,
        sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => ErrorKind::Closed,
        sqlx::Error::Configuration(_) => ErrorKind::Configuration,
        sqlx::Error::Io(io) => match io.kind() {
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => ErrorKind::ConnectionReset,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Network,
        },
        sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => ErrorKind::Network,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| kind_for_sqlstate(code.as_ref()))
            .unwrap_or(ErrorKind::Other),
        _ => ErrorKind::Other,
    };

    BackendError::new(kind, error.to_string())
}

/// Map a SQLSTATE code to an error kind by its class prefix.
fn kind_for_sqlstate(code: &str) -> Option<ErrorKind> {
    if code.len() < 2 {
        return None;
    }
    match &code[..2] {
        // connection exception
        "08" => Some(ErrorKind::Network),
        // insufficient resources / operator intervention
        "53" | "57" => Some(ErrorKind::Network),
        "23" => Some(ErrorKind::ConstraintViolation),
        "28" => Some(ErrorKind::PermissionDenied),
        "42" => Some(ErrorKind::Syntax),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_classification() {
        assert_eq!(kind_for_sqlstate("08006"), Some(ErrorKind::Network));
        assert_eq!(kind_for_sqlstate("53300"), Some(ErrorKind::Network));
        assert_eq!(kind_for_sqlstate("57P01"), Some(ErrorKind::Network));
        assert_eq!(kind_for_sqlstate("23505"), Some(ErrorKind::ConstraintViolation));
        assert_eq!(kind_for_sqlstate("28P01"), Some(ErrorKind::PermissionDenied));
        assert_eq!(kind_for_sqlstate("42601"), Some(ErrorKind::Syntax));
        assert_eq!(kind_for_sqlstate("22012"), None);
        assert_eq!(kind_for_sqlstate("0"), None);
    }

    #[test]
    fn test_transient_sqlstates_are_retryable() {
        for code in ["08006", "08001", "53300", "57P01"] {
            let kind = kind_for_sqlstate(code).unwrap();
            assert!(kind.is_retryable(), "SQLSTATE {} should be retryable", code);
        }
        for code in ["23505", "28P01", "42601"] {
            let kind = kind_for_sqlstate(code).unwrap();
            assert!(!kind.is_retryable(), "SQLSTATE {} should be fatal", code);
        }
    }

    #[test]
    fn test_io_error_classification() {
        let reset = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert_eq!(classify_sqlx_error(reset).kind, ErrorKind::ConnectionReset);

        let timed_out = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "socket timeout",
        ));
        assert_eq!(classify_sqlx_error(timed_out).kind, ErrorKind::Timeout);

        let refused = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(classify_sqlx_error(refused).kind, ErrorKind::Network);
    }

    #[test]
    fn test_pool_error_classification() {
        assert_eq!(
            classify_sqlx_error(sqlx::Error::PoolTimedOut).kind,
            ErrorKind::Timeout
        );
        assert_eq!(
            classify_sqlx_error(sqlx::Error::PoolClosed).kind,
            ErrorKind::Closed
        );
    }
}
