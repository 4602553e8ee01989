//! Market classification for coinboard.
//!
//! Derives a coarse market regime (SURGE/BULL/CRAB/BEAR) and an advisory
//! signal (STRONG_BUY..STRONG_SELL) from a market-cap ranked asset list.
//! Both are pure functions of their input and traverse it in input order.

pub mod classifier;
pub mod config;
pub mod error;
pub mod regime;
pub mod signal;

pub use classifier::MarketClassifier;
pub use config::ClassifierConfig;
pub use error::{SignalError, SignalResult};
pub use regime::{detect_regime, read_regime, RegimeReading};
pub use signal::{compute_signal, score, signal_for_score};
