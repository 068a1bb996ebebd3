//! Error types for configuration and identifier handling.

use thiserror::Error;

/// Result type alias for configuration-boundary operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Malformed or contradictory desired configuration. Always
    /// recoverable by the caller correcting its input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed persisted entity identifier. Indicates corrupted
    /// external state; fatal for the call that observed it.
    #[error("failed to parse entity identifier: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ConfigError::Validation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        ConfigError::Parse(msg.into())
    }
}
