//! Error types for snapindex-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed partition record (key or payload)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Invalid shard or routing configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Routing strategy identifier not present in the registry
    #[error("Unknown routing strategy: {0}")]
    UnknownStrategy(String),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Error::InvalidRecord(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an unknown strategy error
    pub fn unknown_strategy(msg: impl Into<String>) -> Self {
        Error::UnknownStrategy(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
