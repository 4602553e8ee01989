//! Combined regime and signal classification.

use crate::config::ClassifierConfig;
use crate::error::SignalResult;
use crate::regime::read_regime;
use crate::signal::{score, signal_for_score};
use coinboard_core::{Classification, MarketAsset};
use tracing::debug;

/// Classifies an asset set into a regime and an advisory signal.
#[derive(Debug, Clone, Default)]
pub struct MarketClassifier {
    config: ClassifierConfig,
}

impl MarketClassifier {
    /// Create a classifier, rejecting an inconsistent configuration.
    pub fn new(config: ClassifierConfig) -> SignalResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify the assets in the order given.
    ///
    /// The caller supplies the list already ranked (market cap descending);
    /// no re-sorting happens here so identical input gives identical output.
    pub fn classify(&self, assets: &[MarketAsset]) -> Classification {
        let reading = read_regime(assets, &self.config);
        let score = score(assets, &self.config);
        let signal = signal_for_score(score, &self.config);

        debug!(
            assets = assets.len(),
            regime = %reading.regime,
            signal = %signal,
            weighted_change = reading.weighted_change,
            breadth = reading.breadth,
            score,
            "Classified market"
        );

        Classification {
            regime: reading.regime,
            signal,
            weighted_change: reading.weighted_change,
            breadth: reading.breadth,
            score,
        }
    }
}
