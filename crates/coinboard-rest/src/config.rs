//! REST configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestConfig {
    /// Market-cap ranked asset list (CoinGecko `/coins/markets` shape).
    #[serde(default = "default_markets_url")]
    pub markets_url: String,
    /// 24h ticker statistics (Binance `/ticker/24hr` shape).
    #[serde(default = "default_tickers_url")]
    pub tickers_url: String,
    /// Quote asset stripped from ticker symbols.
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    /// Minimum spacing between upstream requests.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How often the market list is refreshed.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_markets_url() -> String {
    "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&order=market_cap_desc&per_page=50&page=1&price_change_percentage=24h,7d".to_string()
}

fn default_tickers_url() -> String {
    "https://api.binance.com/api/v3/ticker/24hr".to_string()
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_min_interval_ms() -> u64 {
    1_500
}

fn default_cache_ttl_ms() -> u64 {
    30_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            markets_url: default_markets_url(),
            tickers_url: default_tickers_url(),
            quote_asset: default_quote_asset(),
            min_interval_ms: default_min_interval_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RestConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
