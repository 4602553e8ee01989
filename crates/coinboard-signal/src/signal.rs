//! Advisory signal scoring.

use crate::config::ClassifierConfig;
use coinboard_core::{AdvisorySignal, MarketAsset};

/// Score the asset list with default thresholds.
pub fn compute_signal(assets: &[MarketAsset]) -> AdvisorySignal {
    let config = ClassifierConfig::default();
    signal_for_score(score(assets, &config), &config)
}

/// Weighted blended score over the first `signal_top_n` assets.
///
/// Each asset contributes `change24h * weight_24h + change7d * weight_7d`,
/// weighted by `ln(marketCap)` floored at 1. A missing 7d change counts as 0.
pub fn score(assets: &[MarketAsset], config: &ClassifierConfig) -> f64 {
    let mut weight_sum = 0.0;
    let mut value_sum = 0.0;

    for asset in assets.iter().take(config.signal_top_n) {
        let change_7d = asset.change_percent_7d.unwrap_or(0.0);
        let blended = asset.change_percent_24h * config.weight_24h + change_7d * config.weight_7d;
        if !blended.is_finite() {
            continue;
        }
        let weight = log_weight(asset.market_cap);
        weight_sum += weight;
        value_sum += weight * blended;
    }

    if weight_sum > 0.0 {
        value_sum / weight_sum
    } else {
        0.0
    }
}

/// Map a score onto the five-step signal scale.
pub fn signal_for_score(score: f64, config: &ClassifierConfig) -> AdvisorySignal {
    if score > config.strong_buy_score {
        AdvisorySignal::StrongBuy
    } else if score > config.buy_score {
        AdvisorySignal::Buy
    } else if score < config.strong_sell_score {
        AdvisorySignal::StrongSell
    } else if score < config.sell_score {
        AdvisorySignal::Sell
    } else {
        AdvisorySignal::Neutral
    }
}

fn log_weight(market_cap: f64) -> f64 {
    if market_cap.is_finite() && market_cap > 0.0 {
        market_cap.ln().max(1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets(n: usize, change_24h: f64, change_7d: Option<f64>) -> Vec<MarketAsset> {
        (0..n)
            .map(|i| {
                MarketAsset::new(format!("coin-{i}"), format!("C{i}"))
                    .with_change(change_24h, change_7d)
                    .with_market_cap(1e9 * (i + 1) as f64)
            })
            .collect()
    }

    #[test]
    fn test_empty_is_neutral() {
        assert_eq!(compute_signal(&[]), AdvisorySignal::Neutral);
    }

    #[test]
    fn test_strong_uptrend_is_buy_side() {
        let signal = compute_signal(&assets(15, 10.0, Some(15.0)));
        assert!(matches!(
            signal,
            AdvisorySignal::Buy | AdvisorySignal::StrongBuy
        ));
        assert_eq!(signal, AdvisorySignal::StrongBuy);
    }

    #[test]
    fn test_score_bands() {
        let config = ClassifierConfig::default();
        assert_eq!(signal_for_score(6.5, &config), AdvisorySignal::StrongBuy);
        assert_eq!(signal_for_score(3.0, &config), AdvisorySignal::Buy);
        assert_eq!(signal_for_score(2.0, &config), AdvisorySignal::Neutral);
        assert_eq!(signal_for_score(-2.0, &config), AdvisorySignal::Neutral);
        assert_eq!(signal_for_score(-3.0, &config), AdvisorySignal::Sell);
        assert_eq!(signal_for_score(-6.5, &config), AdvisorySignal::StrongSell);
    }

    #[test]
    fn test_missing_7d_counts_as_zero() {
        let config = ClassifierConfig::default();
        let s = score(&assets(15, 5.0, None), &config);
        assert!((s - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_downtrend() {
        assert_eq!(
            compute_signal(&assets(15, -5.0, Some(-5.0))),
            AdvisorySignal::Sell
        );
        assert_eq!(
            compute_signal(&assets(15, -10.0, Some(-10.0))),
            AdvisorySignal::StrongSell
        );
    }

    #[test]
    fn test_tiny_market_cap_weight_floor() {
        assert_eq!(log_weight(0.0), 1.0);
        assert_eq!(log_weight(0.5), 1.0);
        assert_eq!(log_weight(f64::NAN), 1.0);
        assert!(log_weight(1e9) > 20.0);
    }
}
