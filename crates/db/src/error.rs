//! Error types for the connection manager

use crate::backend::BackendError;

/// A handle could not be acquired.
#[derive(Debug, Clone, thiserror::Error)]
#[error("connection failed: {source}")]
pub struct ConnectionError {
    #[source]
    pub source: BackendError,
}

impl ConnectionError {
    pub fn new(source: BackendError) -> Self {
        Self { source }
    }
}

/// A query failed after the retry policy ran its course.
#[derive(Debug, Clone, thiserror::Error)]
#[error("query failed after {attempts} attempt(s): {source}")]
pub struct QueryError {
    /// Total attempts made, including the first
    pub attempts: u32,
    /// Whether any retry was attempted
    pub retried: bool,
    #[source]
    pub source: BackendError,
}

/// Public error type for manager operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ManagerError {
    #[error("query text must not be empty")]
    EmptyQuery,

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ManagerError {
    /// The structural kind of the underlying backend failure, if any.
    pub fn backend_kind(&self) -> Option<crate::backend::ErrorKind> {
        match self {
            ManagerError::EmptyQuery => None,
            ManagerError::Connection(e) => Some(e.source.kind),
            ManagerError::Query(e) => Some(e.source.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ErrorKind;

    #[test]
    fn test_query_error_display() {
        let err = QueryError {
            attempts: 4,
            retried: true,
            source: BackendError::timeout("attempt exceeded 30000ms"),
        };
        assert_eq!(
            err.to_string(),
            "query failed after 4 attempt(s): timeout: attempt exceeded 30000ms"
        );
    }

    #[test]
    fn test_manager_error_backend_kind() {
        let err = ManagerError::from(ConnectionError::new(BackendError::new(
            ErrorKind::Network,
            "server refused",
        )));
        assert_eq!(err.backend_kind(), Some(ErrorKind::Network));
        assert_eq!(ManagerError::EmptyQuery.backend_kind(), None);
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::new(BackendError::new(
            ErrorKind::Configuration,
            "invalid PostgreSQL URL scheme",
        ));
        assert_eq!(
            err.to_string(),
            "connection failed: configuration: invalid PostgreSQL URL scheme"
        );
    }
}
