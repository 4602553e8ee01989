//! REST access for coinboard.
//!
//! - [`RestClient`]: GET + JSON with status mapping
//! - [`RequestCache`]: TTL cache, in-flight dedup and minimum request spacing
//!   for a rate-limited upstream
//! - [`payload`]: explicit parsers for third-party market and ticker payloads

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod payload;

pub use cache::{CacheStats, RequestCache};
pub use client::RestClient;
pub use config::RestConfig;
pub use error::{RestError, RestResult};
pub use fetcher::{BoxFuture, Fetcher};
pub use payload::{parse_market_list, parse_ticker_updates};
