//! Backend Abstractions
//!
//! Traits and types the manager uses to talk to a database, plus the
//! production PostgreSQL implementation.

pub mod core;
pub mod postgres;

// Re-export core traits and types
pub use self::core::*;
pub use self::postgres::PostgresBackend;
