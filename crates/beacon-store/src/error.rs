//! Error types for the record store

use thiserror::Error;

/// Record store error type
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement preparation or execution error
    #[error("Query error: {0}")]
    Query(String),

    /// Schema synthesis error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Table or column name that is not a plain SQL identifier
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Record could not be mapped to or from a row
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for record store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
