//! REST error types.
//!
//! Errors are `Clone` because one failed request is delivered to every caller
//! that joined it.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RestError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Unexpected payload shape: {0}")]
    Payload(String),

    #[error("Request task failed: {0}")]
    Task(String),
}

impl RestError {
    /// HTTP status code, if the upstream answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type RestResult<T> = Result<T, RestError>;
