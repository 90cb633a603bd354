//! Error types for the sqlflite client

use thiserror::Error;

/// Core error type for sqlflite client operations
#[derive(Error, Debug)]
pub enum SqlfliteError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Table not found: {0}")]
    NotFound(String),

    #[error("Unknown column reference: {0}")]
    Reference(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for sqlflite client operations
pub type Result<T> = std::result::Result<T, SqlfliteError>;
