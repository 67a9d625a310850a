//! # holdfast-db
//!
//! Resilient single-handle database connection manager.
//!
//! ## Features
//!
//! - **Lazy acquisition**: the backend handle is acquired on first use and
//!   transparently re-acquired after failures or cleanup
//! - **Retry with backoff**: transient failures are retried with exponential
//!   backoff; classification is structural, never message matching
//! - **Keepalive**: a periodic task probes the handle when it sits idle so it
//!   does not go stale between requests
//! - **Observability**: health snapshots and process-lifetime query
//!   statistics, serializable for JSON endpoints
//! - **Backend-agnostic**: a small trait seam with a production PostgreSQL
//!   implementation on sqlx
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use holdfast_db::{ConnectionManager, ManagerConfig, PostgresBackend, SqlValue};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let manager = ConnectionManager::new(
//!     Arc::new(PostgresBackend::new()),
//!     "postgres://localhost/app",
//!     ManagerConfig::default(),
//! );
//!
//! let rows = manager
//!     .query(
//!         "SELECT id, name FROM users WHERE id = $1",
//!         &[SqlValue::from(1i64)],
//!     )
//!     .await
//!     .unwrap();
//!
//! for row in rows {
//!     println!("{}", row.to_json());
//! }
//!
//! manager.cleanup().await;
//! # });
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod manager;

pub use backend::{
    BackendError, BackendHandle, ErrorKind, PostgresBackend, QueryBackend, Row, SqlValue,
};
pub use config::ManagerConfig;
pub use error::{ConnectionError, ManagerError, QueryError};
pub use manager::{ConnectionManager, HealthSnapshot, HealthStatus, QueryStats};
