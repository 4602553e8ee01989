//! Market regime detection.
//!
//! The regime is decided from two measures over the head of the asset list:
//! a market-cap weighted average of the 24h change and the breadth (share of
//! assets that are up). Thresholds are evaluated in a fixed order and the
//! first match wins.

use crate::config::ClassifierConfig;
use coinboard_core::{MarketAsset, MarketRegime};

/// Regime verdict with the measures it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeReading {
    pub regime: MarketRegime,
    pub weighted_change: f64,
    pub breadth: f64,
}

/// Detect the regime with default thresholds.
pub fn detect_regime(assets: &[MarketAsset]) -> MarketRegime {
    read_regime(assets, &ClassifierConfig::default()).regime
}

/// Detect the regime and return the underlying measures.
pub fn read_regime(assets: &[MarketAsset], config: &ClassifierConfig) -> RegimeReading {
    if assets.is_empty() {
        return RegimeReading {
            regime: MarketRegime::Crab,
            weighted_change: 0.0,
            breadth: 0.0,
        };
    }

    let weighted_change = weighted_change(assets, config.regime_top_n);
    let breadth = breadth(assets, config.breadth_top_n);

    let regime = if weighted_change > config.surge_avg
        || (weighted_change > config.surge_confirmed_avg && breadth > config.surge_breadth)
    {
        MarketRegime::Surge
    } else if weighted_change > config.bull_avg && breadth > config.bull_breadth {
        MarketRegime::Bull
    } else if weighted_change < config.bear_avg && breadth < config.bear_breadth {
        MarketRegime::Bear
    } else {
        MarketRegime::Crab
    };

    RegimeReading {
        regime,
        weighted_change,
        breadth,
    }
}

/// Market-cap weighted average 24h change over the first `top_n` assets.
///
/// Assets without a positive market cap weigh 1. Assets whose change is not
/// finite are left out of both sums.
fn weighted_change(assets: &[MarketAsset], top_n: usize) -> f64 {
    let mut weight_sum = 0.0;
    let mut value_sum = 0.0;

    for asset in assets.iter().take(top_n) {
        let change = asset.change_percent_24h;
        if !change.is_finite() {
            continue;
        }
        let weight = if asset.market_cap.is_finite() && asset.market_cap > 0.0 {
            asset.market_cap
        } else {
            1.0
        };
        weight_sum += weight;
        value_sum += weight * change;
    }

    if weight_sum > 0.0 {
        value_sum / weight_sum
    } else {
        0.0
    }
}

/// Share of the first `top_n` assets with a positive 24h change.
fn breadth(assets: &[MarketAsset], top_n: usize) -> f64 {
    let window = &assets[..assets.len().min(top_n)];
    if window.is_empty() {
        return 0.0;
    }
    let advancing = window
        .iter()
        .filter(|a| a.change_percent_24h > 0.0)
        .count();
    advancing as f64 / window.len() as f64
}
