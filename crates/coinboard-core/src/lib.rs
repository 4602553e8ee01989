//! Core domain types for coinboard.
//!
//! This crate provides the types shared by every other crate:
//! - `PriceLevel`, `DepthLevel`, `OrderBookSnapshot`: order book records
//! - `MarketAsset`, `PriceUpdate`: market list entries and live ticks
//! - `MarketRegime`, `AdvisorySignal`, `Classification`: classifier output

pub mod asset;
pub mod book;
pub mod error;

pub use asset::{AdvisorySignal, Classification, MarketAsset, MarketRegime, PriceUpdate};
pub use book::{
    BookSide, BookUpdate, DeltaKind, DepthLevel, OrderBookSnapshot, PriceLevel,
    DEFAULT_DEPTH_LIMIT,
};
pub use error::{CoreError, Result};
