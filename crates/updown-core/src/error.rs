//! Error types for updown-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Invalid direction: {0}")]
    InvalidDirection(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid page request: {0}")]
    InvalidPage(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
