//! Error types for rave-broadcast.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Result type for rave-broadcast operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving fixtures.
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be opened. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A client did not accept a frame in time.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
}
