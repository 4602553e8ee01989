//! Prometheus metrics for coinboard.
//!
//! Covers:
//! - Feed connection state, reconnects and update throughput per symbol
//! - Book quality (spread, mid, imbalance, staleness)
//! - Offload task latency and failures
//! - REST request outcomes
//! - Market regime and advisory signal
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

const FEED_STATES: [&str; 4] = ["disconnected", "connecting", "connected", "gave-up"];
const REGIMES: [&str; 4] = ["SURGE", "BULL", "CRAB", "BEAR"];
const SIGNALS: [&str; 5] = ["STRONG_BUY", "BUY", "NEUTRAL", "SELL", "STRONG_SELL"];

/// Feed state machine current state per symbol.
pub static FEED_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "coinboard_feed_state",
        "Feed state machine current state (1=active, 0=inactive)",
        &["symbol", "state"]
    )
    .unwrap()
});

pub static FEED_UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "coinboard_feed_updates_total",
        "Coalesced book updates applied",
        &["symbol"]
    )
    .unwrap()
});

pub static FEED_RECONNECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "coinboard_feed_reconnects_total",
        "Successful reconnects after the first connection",
        &["symbol"]
    )
    .unwrap()
});

/// Updates superseded inside a frame before being applied.
pub static FEED_COALESCED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "coinboard_feed_coalesced_total",
        "Feed updates dropped by per-frame coalescing",
        &["symbol"]
    )
    .unwrap()
});

pub static FEED_GAVE_UP_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "coinboard_feed_gave_up_total",
        "Feeds that exhausted their reconnect budget",
        &["symbol"]
    )
    .unwrap()
});

/// Parser drops. Labels: kind (message/level).
pub static PARSE_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "coinboard_parse_dropped_total",
        "Feed messages or levels dropped by the parser",
        &["symbol", "kind"]
    )
    .unwrap()
});

pub static BOOK_SPREAD_BPS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "coinboard_book_spread_bps",
        "Current spread in basis points",
        &["symbol"]
    )
    .unwrap()
});

pub static BOOK_MID_PRICE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("coinboard_book_mid_price", "Current mid price", &["symbol"]).unwrap()
});

pub static BOOK_BID_ASK_RATIO: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "coinboard_book_bid_ask_ratio",
        "Bid size share of total visible depth",
        &["symbol"]
    )
    .unwrap()
});

pub static BOOK_AGE_MS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "coinboard_book_age_ms",
        "Age of the current book snapshot in milliseconds",
        &["symbol"]
    )
    .unwrap()
});

pub static BOOK_STALE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "coinboard_book_stale",
        "Book snapshot older than the stale threshold (1=stale)",
        &["symbol"]
    )
    .unwrap()
});

pub static OFFLOAD_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "coinboard_offload_latency_ms",
        "Offload task round-trip latency in milliseconds",
        &["op"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0, 5000.0]
    )
    .unwrap()
});

/// Labels: kind (timeout/task/other).
pub static OFFLOAD_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "coinboard_offload_errors_total",
        "Offload task failures",
        &["op", "kind"]
    )
    .unwrap()
});

/// Labels: outcome (ok/error).
pub static REST_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "coinboard_rest_requests_total",
        "REST fetches by endpoint and outcome",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

pub static MARKET_REGIME: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "coinboard_market_regime",
        "Current market regime (1=active)",
        &["regime"]
    )
    .unwrap()
});

pub static MARKET_SIGNAL: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "coinboard_market_signal",
        "Current advisory signal (1=active)",
        &["signal"]
    )
    .unwrap()
});

pub static MARKET_SCORE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("coinboard_market_score", "Blended advisory signal score").unwrap()
});

pub static MARKET_BREADTH: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "coinboard_market_breadth",
        "Share of the breadth set with a positive 24h change"
    )
    .unwrap()
});

pub static MARKET_WEIGHTED_CHANGE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "coinboard_market_weighted_change",
        "Market-cap weighted 24h change of the regime set"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the feed state for a symbol; only the active state reads 1.
    pub fn feed_state_set(symbol: &str, state: &str) {
        for s in FEED_STATES {
            FEED_STATE.with_label_values(&[symbol, s]).set(0.0);
        }
        FEED_STATE.with_label_values(&[symbol, state]).set(1.0);
    }

    pub fn feed_update(symbol: &str) {
        FEED_UPDATES_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn feed_reconnect(symbol: &str) {
        FEED_RECONNECTS_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn feed_coalesced(symbol: &str, count: u64) {
        if count > 0 {
            FEED_COALESCED_TOTAL
                .with_label_values(&[symbol])
                .inc_by(count as f64);
        }
    }

    pub fn feed_gave_up(symbol: &str) {
        FEED_GAVE_UP_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn parse_dropped(symbol: &str, kind: &str, count: u64) {
        if count > 0 {
            PARSE_DROPPED_TOTAL
                .with_label_values(&[symbol, kind])
                .inc_by(count as f64);
        }
    }

    /// Record book quality from a committed snapshot.
    pub fn book_snapshot(symbol: &str, spread_percent: f64, mid_price: f64, bid_ask_ratio: f64) {
        BOOK_SPREAD_BPS
            .with_label_values(&[symbol])
            .set(spread_percent * 100.0);
        BOOK_MID_PRICE.with_label_values(&[symbol]).set(mid_price);
        BOOK_BID_ASK_RATIO
            .with_label_values(&[symbol])
            .set(bid_ask_ratio);
    }

    pub fn book_age(symbol: &str, age_ms: u64, stale: bool) {
        BOOK_AGE_MS.with_label_values(&[symbol]).set(age_ms as f64);
        BOOK_STALE
            .with_label_values(&[symbol])
            .set(if stale { 1.0 } else { 0.0 });
    }

    pub fn offload_latency(op: &str, latency_ms: f64) {
        OFFLOAD_LATENCY_MS
            .with_label_values(&[op])
            .observe(latency_ms);
    }

    pub fn offload_error(op: &str, kind: &str) {
        OFFLOAD_ERRORS_TOTAL.with_label_values(&[op, kind]).inc();
    }

    pub fn rest_request(endpoint: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        REST_REQUESTS_TOTAL
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    /// Record the latest classification; only the active regime and signal
    /// read 1.
    pub fn market_classification(
        regime: &str,
        signal: &str,
        score: f64,
        breadth: f64,
        weighted_change: f64,
    ) {
        for r in REGIMES {
            MARKET_REGIME.with_label_values(&[r]).set(0.0);
        }
        MARKET_REGIME.with_label_values(&[regime]).set(1.0);

        for s in SIGNALS {
            MARKET_SIGNAL.with_label_values(&[s]).set(0.0);
        }
        MARKET_SIGNAL.with_label_values(&[signal]).set(1.0);

        MARKET_SCORE.set(score);
        MARKET_BREADTH.set(breadth);
        MARKET_WEIGHTED_CHANGE.set(weighted_change);
    }

    /// Render the default registry in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_state_single_active() {
        Metrics::feed_state_set("TESTUSDT", "connecting");
        Metrics::feed_state_set("TESTUSDT", "connected");

        assert_eq!(
            FEED_STATE
                .with_label_values(&["TESTUSDT", "connected"])
                .get(),
            1.0
        );
        assert_eq!(
            FEED_STATE
                .with_label_values(&["TESTUSDT", "connecting"])
                .get(),
            0.0
        );
    }

    #[test]
    fn test_coalesced_ignores_zero() {
        Metrics::feed_coalesced("COALUSDT", 0);
        Metrics::feed_coalesced("COALUSDT", 3);
        assert_eq!(
            FEED_COALESCED_TOTAL.with_label_values(&["COALUSDT"]).get(),
            3.0
        );
    }

    #[test]
    fn test_classification_gauges() {
        Metrics::market_classification("BULL", "BUY", 3.5, 0.6, 2.0);
        assert_eq!(MARKET_REGIME.with_label_values(&["BULL"]).get(), 1.0);
        assert_eq!(MARKET_REGIME.with_label_values(&["CRAB"]).get(), 0.0);
        assert_eq!(MARKET_SIGNAL.with_label_values(&["BUY"]).get(), 1.0);
    }

    #[test]
    fn test_gather_text() {
        Metrics::feed_update("GATHERUSDT");
        Metrics::parse_dropped("GATHERUSDT", "level", 0);
        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("coinboard_feed_updates_total"));
        assert!(text.contains("GATHERUSDT"));
    }
}
