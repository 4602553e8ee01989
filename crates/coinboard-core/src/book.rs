//! Order book types.
//!
//! A feed message carries raw `PriceLevel`s. After aggregation each side
//! becomes a list of `DepthLevel`s, and both sides together with their
//! derived scalars form an `OrderBookSnapshot`.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of levels kept per side.
pub const DEFAULT_DEPTH_LIMIT: usize = 20;

/// A raw price level from the feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

impl PriceLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    /// Both price and size are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.price.is_finite() && self.size.is_finite()
    }
}

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    /// Whether `a` is a better price than `b` on this side.
    ///
    /// Bids improve upwards, asks improve downwards.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        match self {
            Self::Bid => a > b,
            Self::Ask => a < b,
        }
    }

    /// Sort levels best price first (stable, NaN-safe).
    pub fn sort_levels(&self, levels: &mut [PriceLevel]) {
        match self {
            Self::Bid => levels.sort_by(|a, b| b.price.total_cmp(&a.price)),
            Self::Ask => levels.sort_by(|a, b| a.price.total_cmp(&b.price)),
        }
    }
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

impl FromStr for BookSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bid" | "bids" | "buy" => Ok(Self::Bid),
            "ask" | "asks" | "sell" => Ok(Self::Ask),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// Change of a level's size relative to the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    /// Price was not present in the previous snapshot.
    New,
    /// Size is exactly zero.
    Removed,
    /// Size grew.
    Up,
    /// Size shrank.
    Down,
    /// Unchanged.
    Same,
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Removed => "removed",
            Self::Up => "up",
            Self::Down => "down",
            Self::Same => "same",
        };
        f.write_str(s)
    }
}

/// An aggregated level with cumulative depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthLevel {
    pub price: f64,
    pub size: f64,
    /// Running sum of sizes from the best price up to this level.
    pub cumulative_size: f64,
    /// `cumulative_size` relative to the deepest level, in `[0, 100]`.
    pub depth_percent: f64,
    pub delta: DeltaKind,
}

/// One parsed feed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookUpdate {
    pub symbol: String,
    #[serde(default)]
    pub last_update_id: Option<u64>,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl BookUpdate {
    pub fn new(symbol: impl Into<String>, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self {
            symbol: symbol.into(),
            last_update_id: None,
            bids,
            asks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Aggregated order book with derived scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookSnapshot {
    pub symbol: String,
    /// Bids, best (highest) price first.
    pub bids: Vec<DepthLevel>,
    /// Asks, best (lowest) price first.
    pub asks: Vec<DepthLevel>,
    /// Best ask minus best bid (0 if either side is empty).
    pub spread: f64,
    /// Average of best bid and best ask (0 if either side is empty).
    pub mid_price: f64,
    /// `spread / mid * 100` (0 if mid is 0).
    pub spread_percent: f64,
    pub bid_total: f64,
    pub ask_total: f64,
    /// `bid_total / (bid_total + ask_total)`, 0.5 when both are empty.
    pub bid_ask_ratio: f64,
    pub updated_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    /// Build a snapshot from already aggregated sides.
    pub fn new(symbol: impl Into<String>, bids: Vec<DepthLevel>, asks: Vec<DepthLevel>) -> Self {
        let best_bid = bids.first().map(|l| l.price);
        let best_ask = asks.first().map(|l| l.price);

        let (spread, mid_price) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => (ask - bid, (bid + ask) / 2.0),
            _ => (0.0, 0.0),
        };
        let spread_percent = if mid_price != 0.0 {
            spread / mid_price * 100.0
        } else {
            0.0
        };

        let bid_total: f64 = bids.iter().map(|l| l.size).sum();
        let ask_total: f64 = asks.iter().map(|l| l.size).sum();
        let total = bid_total + ask_total;
        let bid_ask_ratio = if total > 0.0 {
            (bid_total / total).clamp(0.0, 1.0)
        } else {
            0.5
        };

        Self {
            symbol: symbol.into(),
            bids,
            asks,
            spread,
            mid_price,
            spread_percent,
            bid_total,
            ask_total,
            bid_ask_ratio,
            updated_at: Utc::now(),
        }
    }

    /// Empty book for a symbol.
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self::new(symbol, Vec::new(), Vec::new())
    }

    pub fn side(&self, side: BookSide) -> &[DepthLevel] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.asks.first()
    }

    /// Both sides have at least one level and the book is not crossed.
    pub fn is_two_sided(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price < ask.price,
            _ => false,
        }
    }

    /// Age of this snapshot in milliseconds.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.updated_at).num_milliseconds()
    }
}
