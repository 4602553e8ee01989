//! Order book state.
//!
//! Holds the current and previous snapshot per symbol. The previous snapshot
//! is what the next update's deltas are computed against; anything older is
//! discarded.

use crate::depth::build_snapshot;
use coinboard_core::{BookUpdate, OrderBookSnapshot, DEFAULT_DEPTH_LIMIT};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Per-symbol book container.
#[derive(Debug, Default)]
pub struct BookEntry {
    pub current: Option<OrderBookSnapshot>,
    pub previous: Option<OrderBookSnapshot>,
    /// Monotonic time the current snapshot was committed.
    pub recv_mono: Option<Instant>,
    pub update_count: u64,
}

impl BookEntry {
    fn commit(&mut self, snapshot: OrderBookSnapshot) {
        self.previous = self.current.replace(snapshot);
        self.recv_mono = Some(Instant::now());
        self.update_count += 1;
    }

    /// Age of the current snapshot in milliseconds (monotonic).
    pub fn age_ms(&self) -> Option<u64> {
        self.recv_mono.map(|t| t.elapsed().as_millis() as u64)
    }
}

type Entry = Arc<RwLock<BookEntry>>;

/// Order book store keyed by symbol.
pub struct BookStore {
    books: DashMap<String, Entry>,
    depth_limit: usize,
}

impl BookStore {
    pub fn new(depth_limit: usize) -> Self {
        Self {
            books: DashMap::new(),
            depth_limit,
        }
    }

    pub fn depth_limit(&self) -> usize {
        self.depth_limit
    }

    fn get_or_create(&self, symbol: &str) -> Entry {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(BookEntry::default())))
            .clone()
    }

    /// Aggregate an update against the current snapshot and commit it.
    pub fn apply(&self, update: &BookUpdate) -> OrderBookSnapshot {
        let entry = self.get_or_create(&update.symbol);
        let mut guard = entry.write();
        let snapshot = build_snapshot(update, guard.current.as_ref(), self.depth_limit);
        guard.commit(snapshot.clone());
        trace!(symbol = %update.symbol, mid = snapshot.mid_price, "Book updated");
        snapshot
    }

    /// Commit a snapshot aggregated elsewhere.
    pub fn commit(&self, snapshot: OrderBookSnapshot) {
        let entry = self.get_or_create(&snapshot.symbol);
        entry.write().commit(snapshot);
    }

    pub fn current(&self, symbol: &str) -> Option<OrderBookSnapshot> {
        self.books
            .get(symbol)
            .and_then(|e| e.read().current.clone())
    }

    pub fn previous(&self, symbol: &str) -> Option<OrderBookSnapshot> {
        self.books
            .get(symbol)
            .and_then(|e| e.read().previous.clone())
    }

    pub fn age_ms(&self, symbol: &str) -> Option<u64> {
        self.books.get(symbol).and_then(|e| e.read().age_ms())
    }

    pub fn update_count(&self, symbol: &str) -> u64 {
        self.books
            .get(symbol)
            .map(|e| e.read().update_count)
            .unwrap_or(0)
    }

    /// No snapshot yet, or the current one is older than `threshold_ms`.
    pub fn is_stale(&self, symbol: &str, threshold_ms: u64) -> bool {
        self.age_ms(symbol).map_or(true, |age| age > threshold_ms)
    }

    /// Known symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.books.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

impl Default for BookStore {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinboard_core::{DeltaKind, PriceLevel};

    fn update(symbol: &str, bid_size: f64) -> BookUpdate {
        BookUpdate::new(
            symbol,
            vec![PriceLevel::new(100.0, bid_size)],
            vec![PriceLevel::new(101.0, 1.0)],
        )
    }

    #[test]
    fn test_apply_keeps_current_and_previous() {
        let store = BookStore::default();
        assert!(store.current("BTCUSDT").is_none());

        store.apply(&update("BTCUSDT", 1.0));
        assert!(store.previous("BTCUSDT").is_none());

        let snap = store.apply(&update("BTCUSDT", 2.0));
        assert_eq!(snap.bids[0].delta, DeltaKind::Up);
        assert_eq!(store.previous("BTCUSDT").unwrap().bids[0].size, 1.0);
        assert_eq!(store.current("BTCUSDT").unwrap().bids[0].size, 2.0);

        store.apply(&update("BTCUSDT", 3.0));
        assert_eq!(store.previous("BTCUSDT").unwrap().bids[0].size, 2.0);
        assert_eq!(store.update_count("BTCUSDT"), 3);
    }

    #[test]
    fn test_symbols_independent() {
        let store = BookStore::default();
        store.apply(&update("ETHUSDT", 1.0));
        store.apply(&update("BTCUSDT", 1.0));

        assert_eq!(store.symbols(), vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(store.update_count("ETHUSDT"), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_stale_detection() {
        let store = BookStore::default();
        assert!(store.is_stale("BTCUSDT", 1_000));

        store.apply(&update("BTCUSDT", 1.0));
        assert!(!store.is_stale("BTCUSDT", 60_000));
    }

    #[test]
    fn test_commit_external_snapshot() {
        let store = BookStore::new(5);
        let snap = build_snapshot(&update("SOLUSDT", 4.0), None, 5);
        store.commit(snap);
        assert_eq!(store.current("SOLUSDT").unwrap().bid_total, 4.0);
    }
}
