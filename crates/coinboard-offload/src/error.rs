//! Offload error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OffloadError {
    /// No reply arrived within the dispatch timeout.
    #[error("Task {op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    /// The worker replied with an error.
    #[error("Task failed: {0}")]
    Task(String),

    #[error("Executor shut down")]
    Shutdown,

    #[error("Unexpected reply for {0}")]
    UnexpectedReply(&'static str),

    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OffloadError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type OffloadResult<T> = Result<T, OffloadError>;
