//! Classifier error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type SignalResult<T> = Result<T, SignalError>;
