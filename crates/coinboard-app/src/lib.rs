//! coinboard application.
//!
//! Wires the data core together:
//! - Depth feeds per symbol (reconnecting WebSocket clients)
//! - Book aggregation and market classification on the offload worker
//! - Market list polling through the shared request cache
//! - Status output as structured logs and Prometheus metrics

pub mod app;
pub mod config;
pub mod error;

pub use app::{AppContext, Application, DepthDecoder, MarketBoard};
pub use config::{AppConfig, DashboardConfig, FeedSection};
pub use error::{AppError, AppResult};
