//! Error types for rave-beat.

use thiserror::Error;

/// Result type for rave-beat operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the beat clock and sequencer.
#[derive(Debug, Error)]
pub enum Error {
    /// Tempo or cycle configuration cannot drive a clock.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The catalog has no template for the animation the policy asked for.
    #[error("no catalog template for animation '{animation}' (beat {beat})")]
    CatalogLookup { animation: String, beat: u64 },

    /// A command was requested before the first tick.
    #[error("no beat has been counted yet")]
    NotStarted,
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}
