// src/error.rs

//! Unified error handling for the indexer.

use std::fmt;

use thiserror::Error;

/// Result type alias for indexer operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Transient connection, socket, DNS or timeout failure
    #[error("Network error ({context}): {message}")]
    Network { context: String, message: String },

    /// Connection retries exhausted; the run cannot continue
    #[error("Connection retries exhausted after {attempts} attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    /// A shutdown request interrupted a wait or a retry loop
    #[error("Interrupted by shutdown request")]
    Interrupted,

    /// Primary store rejected or failed an operation
    #[error("Store error: {0}")]
    Store(String),

    /// Search index rejected or failed an operation
    #[error("Index error: {0}")]
    Index(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MongoDB driver failure
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a network error with context.
    pub fn network(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Network {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create an index error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error is transient and should be handled by reconnecting.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::Mongo(e) => matches!(
                e.kind.as_ref(),
                mongodb::error::ErrorKind::Io(_)
                    | mongodb::error::ErrorKind::ServerSelection { .. }
                    | mongodb::error::ErrorKind::ConnectionPoolCleared { .. }
                    | mongodb::error::ErrorKind::DnsResolve { .. }
            ),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Whether the run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionExhausted { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(AppError::network("find", "socket closed").is_network());
        assert!(AppError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_network());
        assert!(!AppError::store("duplicate key").is_network());
        assert!(!AppError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_network());
    }

    #[test]
    fn test_only_exhaustion_is_fatal() {
        let exhausted = AppError::ConnectionExhausted {
            attempts: 10,
            last_error: "refused".into(),
        };
        assert!(exhausted.is_fatal());
        assert!(!AppError::network("connect", "refused").is_fatal());
        assert!(!AppError::index("mapping conflict").is_fatal());
        assert!(!AppError::Interrupted.is_fatal());
        assert!(AppError::Interrupted.is_interrupted());
    }
}
