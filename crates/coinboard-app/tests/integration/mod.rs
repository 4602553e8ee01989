//! Integration tests for coinboard-app.
//!
//! These tests verify the interaction between components:
//! - Depth feed lifecycle against a mock WebSocket server
//! - Book commits through the offload worker
//! - Market polling through the request cache

pub mod common;
