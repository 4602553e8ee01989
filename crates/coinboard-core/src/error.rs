//! Error types for coinboard-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid book side: {0}")]
    InvalidSide(String),

    #[error("Invalid market regime: {0}")]
    InvalidRegime(String),

    #[error("Invalid advisory signal: {0}")]
    InvalidSignal(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
