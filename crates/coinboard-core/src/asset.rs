//! Market list types and classifier output.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One entry of a market-cap ranked asset list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAsset {
    pub id: String,
    /// Ticker symbol, upper case (e.g. "BTC").
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub change_percent_24h: f64,
    #[serde(default)]
    pub change_percent_7d: Option<f64>,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub volume_24h: f64,
    #[serde(default)]
    pub rank: Option<u32>,
}

impl MarketAsset {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            name: String::new(),
            price: 0.0,
            change_percent_24h: 0.0,
            change_percent_7d: None,
            market_cap: 0.0,
            volume_24h: 0.0,
            rank: None,
        }
    }

    pub fn with_change(mut self, change_24h: f64, change_7d: Option<f64>) -> Self {
        self.change_percent_24h = change_24h;
        self.change_percent_7d = change_7d;
        self
    }

    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = market_cap;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    /// Apply a live tick.
    ///
    /// Market cap is scaled with the price move so the list stays
    /// consistently ranked between REST polls.
    pub fn apply_update(&mut self, update: &PriceUpdate) {
        if !update.price.is_finite() || update.price <= 0.0 {
            return;
        }
        if self.price > 0.0 && self.market_cap > 0.0 {
            self.market_cap *= update.price / self.price;
        }
        self.price = update.price;
        if let Some(change) = update.change_percent_24h.filter(|c| c.is_finite()) {
            self.change_percent_24h = change;
        }
    }
}

/// A live ticker tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    /// Base asset symbol, upper case (e.g. "BTC").
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub change_percent_24h: Option<f64>,
}

impl PriceUpdate {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change_percent_24h: None,
        }
    }
}

/// Coarse market trend classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    Surge,
    Bull,
    #[default]
    Crab,
    Bear,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Surge => "SURGE",
            Self::Bull => "BULL",
            Self::Crab => "CRAB",
            Self::Bear => "BEAR",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketRegime {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SURGE" => Ok(Self::Surge),
            "BULL" => Ok(Self::Bull),
            "CRAB" => Ok(Self::Crab),
            "BEAR" => Ok(Self::Bear),
            other => Err(CoreError::InvalidRegime(other.to_string())),
        }
    }
}

/// Advisory trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvisorySignal {
    StrongBuy,
    Buy,
    #[default]
    Neutral,
    Sell,
    StrongSell,
}

impl AdvisorySignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Neutral => "NEUTRAL",
            Self::Sell => "SELL",
            Self::StrongSell => "STRONG_SELL",
        }
    }
}

impl fmt::Display for AdvisorySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdvisorySignal {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STRONG_BUY" => Ok(Self::StrongBuy),
            "BUY" => Ok(Self::Buy),
            "NEUTRAL" => Ok(Self::Neutral),
            "SELL" => Ok(Self::Sell),
            "STRONG_SELL" => Ok(Self::StrongSell),
            other => Err(CoreError::InvalidSignal(other.to_string())),
        }
    }
}

/// Full classifier output for one asset set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub regime: MarketRegime,
    pub signal: AdvisorySignal,
    /// Market-cap weighted 24h change of the regime set.
    pub weighted_change: f64,
    /// Fraction of the breadth set with a positive 24h change.
    pub breadth: f64,
    /// Weighted blended score of the signal set.
    pub score: f64,
}
