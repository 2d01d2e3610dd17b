//! Error types for the message bus

use beacon_pool::PoolError;
use thiserror::Error;

/// Message bus error type
#[derive(Error, Debug)]
pub enum BusError {
    /// Broker unreachable or the connection is down
    #[error("Connection error: {0}")]
    Connection(String),

    /// Topic or topic filter that violates the naming rules
    #[error("Invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Local acknowledgement did not arrive in time
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// Client-side transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Router has been closed
    #[error("Router is closed")]
    Closed,

    /// Task pool refused the dispatch
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialization(err.to_string())
    }
}

impl From<rumqttc::ClientError> for BusError {
    fn from(err: rumqttc::ClientError) -> Self {
        BusError::Transport(err.to_string())
    }
}
