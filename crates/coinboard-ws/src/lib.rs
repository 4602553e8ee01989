//! Reconnecting WebSocket feed client.
//!
//! Provides:
//! - Bounded exponential backoff with deterministic jitter
//! - Terminal `GaveUp` state after the retry budget is spent
//! - Per-frame coalescing of decoded updates (latest wins)
//! - Idle watchdog and ping/pong handling
//! - Cancellation-token shutdown

pub mod backoff;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod watchdog;

pub use backoff::{backoff_delay, jitter_ms};
pub use client::{ConnectionState, FeedClient, FeedEvent, FeedStats};
pub use config::FeedConfig;
pub use decoder::{JsonDecoder, MessageDecoder};
pub use error::{WsError, WsResult};
pub use watchdog::IdleWatchdog;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
