//! Feed client configuration.

use crate::error::{WsError, WsResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Text frame sent right after the connection opens.
    #[serde(default)]
    pub subscribe_message: Option<String>,
    /// Reconnects allowed before giving up (0 = give up on first failure).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Coalescing window; at most one update is emitted per frame.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Connection is considered dead after this long without a frame.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Capacity of the event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_max_retries() -> u32 {
    10
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_event_buffer() -> usize {
    256
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            subscribe_message: None,
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl FeedConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn validate(&self) -> WsResult<()> {
        if self.url.is_empty() {
            return Err(WsError::InvalidConfig("url is empty".to_string()));
        }
        if self.base_delay_ms == 0 {
            return Err(WsError::InvalidConfig(
                "base_delay_ms must be positive".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(WsError::InvalidConfig(format!(
                "max_delay_ms ({}) below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if self.frame_interval_ms == 0 || self.idle_timeout_ms == 0 || self.event_buffer == 0 {
            return Err(WsError::InvalidConfig(
                "frame_interval_ms, idle_timeout_ms and event_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.frame_interval_ms, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = FeedConfig {
            base_delay_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = FeedConfig::default().with_url("");
        assert!(config.validate().is_err());
    }
}
