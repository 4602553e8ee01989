//! Depth message parsing.
//!
//! Parses Binance-style depth messages into typed `BookUpdate`s.
//!
//! Supports three message shapes:
//! 1. Partial depth: `{"lastUpdateId": 1, "bids": [["px", "sz"]], "asks": [...]}`
//! 2. Combined stream: `{"stream": "btcusdt@depth20@100ms", "data": {<partial depth>}}`
//! 3. Diff depth: `{"e": "depthUpdate", "s": "BTCUSDT", "u": 1, "b": [...], "a": [...]}`
//!
//! Levels with a non-finite or non-positive price, or a non-finite or negative
//! size, are dropped before they reach aggregation.

use crate::error::{FeedError, FeedResult};
use coinboard_core::{BookSide, BookUpdate, PriceLevel};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Parse a wire level. Malformed numbers become `NaN`.
pub fn parse_level(price: &str, size: &str) -> PriceLevel {
    PriceLevel::new(parse_number(price), parse_number(size))
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn number_from_value(v: &Value) -> f64 {
    match v {
        Value::String(s) => parse_number(s),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Parser statistics.
#[derive(Debug, Default)]
pub struct ParseStats {
    accepted: AtomicU64,
    dropped_messages: AtomicU64,
    dropped_levels: AtomicU64,
}

impl ParseStats {
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_message(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_levels(&self, n: u64) {
        self.dropped_levels.fetch_add(n, Ordering::Relaxed);
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    pub fn dropped_levels(&self) -> u64 {
        self.dropped_levels.load(Ordering::Relaxed)
    }
}

/// Depth message parser.
pub struct DepthMessageParser {
    /// Symbol used for partial depth payloads, which do not name their symbol.
    default_symbol: Option<String>,
    stats: ParseStats,
}

impl DepthMessageParser {
    pub fn new() -> Self {
        Self {
            default_symbol: None,
            stats: ParseStats::default(),
        }
    }

    /// Parser for a single-symbol stream.
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            default_symbol: Some(symbol.into().to_uppercase()),
            stats: ParseStats::default(),
        }
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse a raw text frame.
    ///
    /// Returns `Ok(None)` for control messages (subscription acks).
    pub fn parse(&self, text: &str) -> FeedResult<Option<BookUpdate>> {
        let result = serde_json::from_str::<Value>(text)
            .map_err(FeedError::from)
            .and_then(|value| self.parse_value(&value));

        match &result {
            Ok(Some(_)) => self.stats.record_accepted(),
            Ok(None) => {}
            Err(e) => {
                self.stats.record_dropped_message();
                debug!(error = %e, "Dropping malformed depth message");
            }
        }
        result
    }

    /// Parse an already decoded JSON value.
    pub fn parse_value(&self, value: &Value) -> FeedResult<Option<BookUpdate>> {
        if value.get("result").is_some() && value.get("id").is_some() {
            trace!("Subscription ack");
            return Ok(None);
        }

        if let (Some(stream), Some(data)) = (
            value.get("stream").and_then(Value::as_str),
            value.get("data"),
        ) {
            let symbol = symbol_from_stream(stream);
            return self.parse_payload(data, Some(symbol)).map(Some);
        }

        self.parse_payload(value, None).map(Some)
    }

    fn parse_payload(&self, data: &Value, stream_symbol: Option<String>) -> FeedResult<BookUpdate> {
        if data.get("e").and_then(Value::as_str) == Some("depthUpdate") {
            let symbol = data
                .get("s")
                .and_then(Value::as_str)
                .map(str::to_uppercase)
                .or(stream_symbol)
                .ok_or_else(|| FeedError::UnknownSymbol("depthUpdate without symbol".into()))?;
            let last_update_id = data.get("u").and_then(Value::as_u64);
            return self.build_update(symbol, last_update_id, data.get("b"), data.get("a"));
        }

        if data.get("bids").is_some() || data.get("asks").is_some() {
            let symbol = stream_symbol
                .or_else(|| self.default_symbol.clone())
                .ok_or_else(|| {
                    FeedError::UnknownSymbol("partial depth without stream symbol".into())
                })?;
            let last_update_id = data.get("lastUpdateId").and_then(Value::as_u64);
            return self.build_update(symbol, last_update_id, data.get("bids"), data.get("asks"));
        }

        Err(FeedError::Parse("Unrecognized depth message".to_string()))
    }

    fn build_update(
        &self,
        symbol: String,
        last_update_id: Option<u64>,
        bids: Option<&Value>,
        asks: Option<&Value>,
    ) -> FeedResult<BookUpdate> {
        let bids = self.parse_side(bids, BookSide::Bid)?;
        let asks = self.parse_side(asks, BookSide::Ask)?;

        Ok(BookUpdate {
            symbol,
            last_update_id,
            bids,
            asks,
        })
    }

    fn parse_side(&self, raw: Option<&Value>, side: BookSide) -> FeedResult<Vec<PriceLevel>> {
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let entries = raw
            .as_array()
            .ok_or_else(|| FeedError::Parse(format!("{side} levels are not an array")))?;

        let mut levels = Vec::with_capacity(entries.len());
        let mut dropped = 0u64;
        for entry in entries {
            match level_from_value(entry) {
                Some(level) if is_usable(&level) => levels.push(level),
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            self.stats.record_dropped_levels(dropped);
            debug!(%side, dropped, "Dropped unusable levels");
        }

        side.sort_levels(&mut levels);
        Ok(levels)
    }
}

impl Default for DepthMessageParser {
    fn default() -> Self {
        Self::new()
    }
}

fn level_from_value(entry: &Value) -> Option<PriceLevel> {
    let arr = entry.as_array()?;
    if arr.len() < 2 {
        return None;
    }
    Some(PriceLevel::new(
        number_from_value(&arr[0]),
        number_from_value(&arr[1]),
    ))
}

fn is_usable(level: &PriceLevel) -> bool {
    level.is_finite() && level.price > 0.0 && level.size >= 0.0
}

/// "btcusdt@depth20@100ms" -> "BTCUSDT"
fn symbol_from_stream(stream: &str) -> String {
    stream
        .split('@')
        .next()
        .unwrap_or(stream)
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        let level = parse_level("50000.10", "1.5");
        assert_eq!(level.price, 50000.10);
        assert_eq!(level.size, 1.5);
    }

    #[test]
    fn test_parse_level_malformed_is_nan() {
        let level = parse_level("abc", "1.0");
        assert!(level.price.is_nan());
        assert!(!level.is_finite());

        let level = parse_level("100", "");
        assert!(level.size.is_nan());
    }

    #[test]
    fn test_parse_partial_depth() {
        let parser = DepthMessageParser::for_symbol("btcusdt");
        let text = r#"{"lastUpdateId": 42,
            "bids": [["100.0", "1.0"], ["99.5", "2.0"]],
            "asks": [["100.5", "0.5"], ["101.0", "3.0"]]}"#;

        let update = parser.parse(text).unwrap().unwrap();
        assert_eq!(update.symbol, "BTCUSDT");
        assert_eq!(update.last_update_id, Some(42));
        assert_eq!(update.bids.len(), 2);
        assert_eq!(update.asks[0].price, 100.5);
        assert_eq!(parser.stats().accepted(), 1);
    }

    #[test]
    fn test_parse_combined_stream() {
        let parser = DepthMessageParser::new();
        let text = r#"{"stream": "ethusdt@depth20@100ms",
            "data": {"lastUpdateId": 7, "bids": [["3000", "1"]], "asks": [["3001", "1"]]}}"#;

        let update = parser.parse(text).unwrap().unwrap();
        assert_eq!(update.symbol, "ETHUSDT");
        assert_eq!(update.bids[0].price, 3000.0);
    }

    #[test]
    fn test_parse_diff_depth() {
        let parser = DepthMessageParser::new();
        let text = r#"{"e": "depthUpdate", "E": 1, "s": "SOLUSDT", "U": 1, "u": 9,
            "b": [["150.1", "10"]], "a": [["150.2", "0"]]}"#;

        let update = parser.parse(text).unwrap().unwrap();
        assert_eq!(update.symbol, "SOLUSDT");
        assert_eq!(update.last_update_id, Some(9));
        assert_eq!(update.asks[0].size, 0.0);
    }

    #[test]
    fn test_subscription_ack_ignored() {
        let parser = DepthMessageParser::new();
        let result = parser.parse(r#"{"result": null, "id": 1}"#).unwrap();
        assert!(result.is_none());
        assert_eq!(parser.stats().accepted(), 0);
        assert_eq!(parser.stats().dropped_messages(), 0);
    }

    #[test]
    fn test_malformed_json_dropped() {
        let parser = DepthMessageParser::for_symbol("BTCUSDT");
        assert!(parser.parse("{not json").is_err());
        assert!(parser.parse(r#"{"foo": 1}"#).is_err());
        assert_eq!(parser.stats().dropped_messages(), 2);
    }

    #[test]
    fn test_partial_depth_without_symbol_rejected() {
        let parser = DepthMessageParser::new();
        let result = parser.parse(r#"{"bids": [], "asks": []}"#);
        assert!(matches!(result, Err(FeedError::UnknownSymbol(_))));
    }

    #[test]
    fn test_unusable_levels_dropped() {
        let parser = DepthMessageParser::for_symbol("BTCUSDT");
        let text = r#"{"bids": [["100", "1"], ["oops", "1"], ["99", "-1"], ["0", "2"], ["98"]],
            "asks": [["101", "NaN"], ["102", "1"]]}"#;

        let update = parser.parse(text).unwrap().unwrap();
        assert_eq!(update.bids.len(), 1);
        assert_eq!(update.asks.len(), 1);
        assert_eq!(parser.stats().dropped_levels(), 5);
        assert!(update
            .bids
            .iter()
            .chain(update.asks.iter())
            .all(|l| l.is_finite()));
    }

    #[test]
    fn test_levels_sorted_per_side() {
        let parser = DepthMessageParser::for_symbol("BTCUSDT");
        let text = r#"{"bids": [["98", "1"], ["100", "1"], ["99", "1"]],
            "asks": [["103", "1"], ["101", "1"], ["102", "1"]]}"#;

        let update = parser.parse(text).unwrap().unwrap();
        let bid_prices: Vec<f64> = update.bids.iter().map(|l| l.price).collect();
        let ask_prices: Vec<f64> = update.asks.iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![100.0, 99.0, 98.0]);
        assert_eq!(ask_prices, vec![101.0, 102.0, 103.0]);
    }

    #[test]
    fn test_numeric_levels_accepted() {
        let parser = DepthMessageParser::for_symbol("BTCUSDT");
        let update = parser
            .parse(r#"{"bids": [[100.5, 2]], "asks": []}"#)
            .unwrap()
            .unwrap();
        assert_eq!(update.bids[0], PriceLevel::new(100.5, 2.0));
    }

    #[test]
    fn test_symbol_from_stream() {
        assert_eq!(symbol_from_stream("btcusdt@depth20@100ms"), "BTCUSDT");
        assert_eq!(symbol_from_stream("ethusdt"), "ETHUSDT");
    }
}
