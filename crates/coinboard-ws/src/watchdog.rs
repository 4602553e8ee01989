//! Idle watchdog.
//!
//! Tracks the time since the last inbound frame of any kind. A connection
//! that goes quiet for longer than the idle timeout is treated as dead.

use parking_lot::RwLock;
use std::time::{Duration, Instant};

pub struct IdleWatchdog {
    timeout_ms: u64,
    last_message: RwLock<Instant>,
}

impl IdleWatchdog {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            last_message: RwLock::new(Instant::now()),
        }
    }

    /// Reset on (re)connect.
    pub fn reset(&self) {
        *self.last_message.write() = Instant::now();
    }

    pub fn record_message(&self) {
        *self.last_message.write() = Instant::now();
    }

    pub fn time_since_last_message_ms(&self) -> u64 {
        self.last_message.read().elapsed().as_millis() as u64
    }

    pub fn is_idle(&self) -> bool {
        self.time_since_last_message_ms() > self.timeout_ms
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Wait for the next idle check.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(Duration::from_millis((self.timeout_ms / 4).max(1))).await;
    }
}
