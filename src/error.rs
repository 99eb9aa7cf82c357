//! RelayDB Error Types

use thiserror::Error;

/// Result type alias for RelayDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// RelayDB error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Database errors
    #[error("{0}")]
    Database(sqlx::Error),

    #[error("{0}")]
    QueryExecution(String),

    // Protocol errors
    #[error("Invalid request format: {0}")]
    MalformedRecord(#[from] serde_json::Error),

    #[error("Invalid token")]
    InvalidToken,

    #[error("{0}")]
    AuthorizationDenied(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("No connection to master server")]
    NotConnected,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<sqlx::Error> for Error {
    /// Errors raised by the server keep only the server's own message
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => Error::QueryExecution(db.message().to_string()),
            other => Error::Database(other),
        }
    }
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionTimeout(_)
                | Error::ConnectionFailed { .. }
                | Error::NotConnected
                | Error::Network(_)
        )
    }

    /// Check if this error means the session with the peer is no longer usable
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Network(_)
                | Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
                | Error::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::ConnectionTimeout("master:8083".into()).is_retryable());
        assert!(Error::NotConnected.is_transport());
        assert!(!Error::InvalidToken.is_retryable());
        assert!(!Error::UnsupportedOperation("MERGE".into()).is_transport());
    }

    #[derive(Debug)]
    struct ServerError(&'static str);

    impl std::fmt::Display for ServerError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "1146 (42S02): {}", self.0)
        }
    }

    impl std::error::Error for ServerError {}

    impl sqlx::error::DatabaseError for ServerError {
        fn message(&self) -> &str {
            self.0
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[test]
    fn test_engine_error_text_is_verbatim() {
        let raw = sqlx::Error::Database(Box::new(ServerError("Table 'x.y' doesn't exist")));
        let err = Error::from(raw);
        assert!(matches!(err, Error::QueryExecution(_)));
        assert_eq!(err.to_string(), "Table 'x.y' doesn't exist");
    }

    #[test]
    fn test_driver_errors_keep_their_text() {
        let err = Error::from(sqlx::Error::Protocol("unexpected packet".into()));
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(err.to_string(), "encountered unexpected or invalid data: unexpected packet");
    }
}
