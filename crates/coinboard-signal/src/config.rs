//! Classifier configuration.

use crate::error::{SignalError, SignalResult};
use serde::{Deserialize, Serialize};

/// Thresholds and window sizes for regime and signal classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Assets (by input order) in the market-cap weighted average.
    #[serde(default = "default_regime_top_n")]
    pub regime_top_n: usize,
    /// Assets (by input order) in the breadth measure.
    #[serde(default = "default_breadth_top_n")]
    pub breadth_top_n: usize,
    /// Assets (by input order) in the signal score.
    #[serde(default = "default_signal_top_n")]
    pub signal_top_n: usize,

    /// Average 24h change above which the regime is SURGE outright.
    #[serde(default = "default_surge_avg")]
    pub surge_avg: f64,
    /// Average 24h change for SURGE when breadth confirms.
    #[serde(default = "default_surge_confirmed_avg")]
    pub surge_confirmed_avg: f64,
    #[serde(default = "default_surge_breadth")]
    pub surge_breadth: f64,
    #[serde(default = "default_bull_avg")]
    pub bull_avg: f64,
    #[serde(default = "default_bull_breadth")]
    pub bull_breadth: f64,
    #[serde(default = "default_bear_avg")]
    pub bear_avg: f64,
    #[serde(default = "default_bear_breadth")]
    pub bear_breadth: f64,

    /// Weight of the 24h change in the blended score.
    #[serde(default = "default_weight_24h")]
    pub weight_24h: f64,
    /// Weight of the 7d change in the blended score.
    #[serde(default = "default_weight_7d")]
    pub weight_7d: f64,
    #[serde(default = "default_strong_buy_score")]
    pub strong_buy_score: f64,
    #[serde(default = "default_buy_score")]
    pub buy_score: f64,
    #[serde(default = "default_sell_score")]
    pub sell_score: f64,
    #[serde(default = "default_strong_sell_score")]
    pub strong_sell_score: f64,
}

fn default_regime_top_n() -> usize {
    10
}

fn default_breadth_top_n() -> usize {
    20
}

fn default_signal_top_n() -> usize {
    15
}

fn default_surge_avg() -> f64 {
    5.0
}

fn default_surge_confirmed_avg() -> f64 {
    3.0
}

fn default_surge_breadth() -> f64 {
    0.75
}

fn default_bull_avg() -> f64 {
    1.5
}

fn default_bull_breadth() -> f64 {
    0.55
}

fn default_bear_avg() -> f64 {
    -1.5
}

fn default_bear_breadth() -> f64 {
    0.45
}

fn default_weight_24h() -> f64 {
    0.6
}

fn default_weight_7d() -> f64 {
    0.4
}

fn default_strong_buy_score() -> f64 {
    6.0
}

fn default_buy_score() -> f64 {
    2.0
}

fn default_sell_score() -> f64 {
    -2.0
}

fn default_strong_sell_score() -> f64 {
    -6.0
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            regime_top_n: default_regime_top_n(),
            breadth_top_n: default_breadth_top_n(),
            signal_top_n: default_signal_top_n(),
            surge_avg: default_surge_avg(),
            surge_confirmed_avg: default_surge_confirmed_avg(),
            surge_breadth: default_surge_breadth(),
            bull_avg: default_bull_avg(),
            bull_breadth: default_bull_breadth(),
            bear_avg: default_bear_avg(),
            bear_breadth: default_bear_breadth(),
            weight_24h: default_weight_24h(),
            weight_7d: default_weight_7d(),
            strong_buy_score: default_strong_buy_score(),
            buy_score: default_buy_score(),
            sell_score: default_sell_score(),
            strong_sell_score: default_strong_sell_score(),
        }
    }
}

impl ClassifierConfig {
    /// Validate configuration values.
    ///
    /// Score thresholds must be ordered
    /// `strong_sell < sell <= buy < strong_buy`, window sizes non-zero and
    /// breadth thresholds within `[0, 1]`.
    pub fn validate(&self) -> SignalResult<()> {
        if self.regime_top_n == 0 || self.breadth_top_n == 0 || self.signal_top_n == 0 {
            return Err(SignalError::ConfigError(
                "window sizes must be non-zero".to_string(),
            ));
        }

        for (name, value) in [
            ("surge_breadth", self.surge_breadth),
            ("bull_breadth", self.bull_breadth),
            ("bear_breadth", self.bear_breadth),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SignalError::ConfigError(format!(
                    "{name} ({value}) must be within [0, 1]"
                )));
            }
        }

        if !(self.strong_sell_score < self.sell_score
            && self.sell_score <= self.buy_score
            && self.buy_score < self.strong_buy_score)
        {
            return Err(SignalError::ConfigError(format!(
                "score thresholds out of order: {} < {} <= {} < {}",
                self.strong_sell_score, self.sell_score, self.buy_score, self.strong_buy_score
            )));
        }

        Ok(())
    }
}
