//! Error types for the task pool

use thiserror::Error;

/// Errors raised by the pool itself
#[derive(Error, Debug)]
pub enum PoolError {
    /// Invalid sizing
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker thread could not be started
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// Pool no longer accepts tasks
    #[error("Task pool is closed")]
    Closed,

    /// `try_submit` found the queue full
    #[error("Task queue is full (capacity: {0})")]
    QueueFull(usize),
}

/// How a single task ended when it did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task returned an error
    #[error("Task '{task}' failed: {message}")]
    Failed { task: String, message: String },

    /// The task panicked; the worker survived
    #[error("Task '{task}' panicked: {message}")]
    Panicked { task: String, message: String },

    /// The task was discarded before it produced an outcome
    #[error("Task was dropped before completion")]
    Dropped,
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

impl<T> From<flume::SendError<T>> for PoolError {
    fn from(_: flume::SendError<T>) -> Self {
        PoolError::Closed
    }
}
