//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] coinboard_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] coinboard_feed::FeedError),

    #[error("Classifier error: {0}")]
    Signal(#[from] coinboard_signal::SignalError),

    #[error("Offload error: {0}")]
    Offload(#[from] coinboard_offload::OffloadError),

    #[error("REST error: {0}")]
    Rest(#[from] coinboard_rest::RestError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] coinboard_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;
