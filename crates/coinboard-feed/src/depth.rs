//! Depth aggregation.
//!
//! Converts a sorted side of raw levels into `DepthLevel`s carrying the
//! running cumulative size, the percentage of the deepest level, and the
//! size change relative to the previous snapshot.

use coinboard_core::{BookUpdate, DeltaKind, DepthLevel, OrderBookSnapshot, PriceLevel};
use std::collections::HashMap;

/// Aggregate one side of the book.
///
/// `levels` must be sorted best price first. Only the first `depth_limit`
/// levels are kept. `previous` is the same side of the prior snapshot.
/// Runs in O(n) over the truncated depth.
pub fn aggregate_depth(
    levels: &[PriceLevel],
    previous: &[DepthLevel],
    depth_limit: usize,
) -> Vec<DepthLevel> {
    let mut prev_sizes: HashMap<u64, f64> = HashMap::with_capacity(previous.len());
    for level in previous {
        // First occurrence wins on duplicate prices.
        prev_sizes.entry(price_key(level.price)).or_insert(level.size);
    }

    let truncated = &levels[..levels.len().min(depth_limit)];

    let mut cumulative = 0.0;
    let mut out: Vec<DepthLevel> = truncated
        .iter()
        .map(|level| {
            cumulative += level.size;
            DepthLevel {
                price: level.price,
                size: level.size,
                cumulative_size: cumulative,
                depth_percent: 0.0,
                delta: classify_delta(level.size, prev_sizes.get(&price_key(level.price)).copied()),
            }
        })
        .collect();

    let max_cumulative = out.last().map(|l| l.cumulative_size).unwrap_or(0.0);
    if max_cumulative > 0.0 && max_cumulative.is_finite() {
        for level in &mut out {
            level.depth_percent = (level.cumulative_size / max_cumulative * 100.0).clamp(0.0, 100.0);
        }
    }

    out
}

/// Build a full snapshot from a feed update and the previous snapshot.
pub fn build_snapshot(
    update: &BookUpdate,
    previous: Option<&OrderBookSnapshot>,
    depth_limit: usize,
) -> OrderBookSnapshot {
    let (prev_bids, prev_asks): (&[DepthLevel], &[DepthLevel]) = match previous {
        Some(prev) => (&prev.bids, &prev.asks),
        None => (&[], &[]),
    };

    let bids = aggregate_depth(&update.bids, prev_bids, depth_limit);
    let asks = aggregate_depth(&update.asks, prev_asks, depth_limit);
    OrderBookSnapshot::new(update.symbol.clone(), bids, asks)
}

fn classify_delta(size: f64, previous: Option<f64>) -> DeltaKind {
    match previous {
        None => DeltaKind::New,
        Some(_) if size == 0.0 => DeltaKind::Removed,
        Some(prev) if size > prev => DeltaKind::Up,
        Some(prev) if size < prev => DeltaKind::Down,
        Some(_) => DeltaKind::Same,
    }
}

/// Hash key for a price; `-0.0` and `0.0` map to the same key.
fn price_key(price: f64) -> u64 {
    if price == 0.0 {
        0.0f64.to_bits()
    } else {
        price.to_bits()
    }
}
