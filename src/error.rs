//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration loading or parsing errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listen port outside the accepted range
    #[error("port should be in the range [1024, 65353], got {0}")]
    InvalidPort(u16),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
