//! Order book feed processing for coinboard.
//!
//! Turns raw depth messages into typed `BookUpdate`s, aggregates them into
//! `OrderBookSnapshot`s with cumulative depth and per-level deltas, and keeps
//! the current and previous snapshot per symbol.

pub mod book_state;
pub mod depth;
pub mod error;
pub mod parser;

pub use book_state::BookStore;
pub use depth::{aggregate_depth, build_snapshot};
pub use error::{FeedError, FeedResult};
pub use parser::{parse_level, DepthMessageParser, ParseStats};
