//! Error types for the controller.

use thiserror::Error;

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end a controller run.
#[derive(Debug, Error)]
pub enum Error {
    /// Beat clock or sequencer error
    #[error("Beat clock error: {0}")]
    Beat(#[from] rave_beat::Error),

    /// Broadcast server error
    #[error("Broadcast error: {0}")]
    Broadcast(#[from] rave_broadcast::Error),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was cancelled
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
