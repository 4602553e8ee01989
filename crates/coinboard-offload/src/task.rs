//! Worker-side task execution.
//!
//! Everything here is synchronous and free of channel plumbing so it can be
//! exercised directly in tests.

use crate::protocol::{OffloadReply, OffloadRequest, OffloadTask, SortKey, TaskResult};
use coinboard_core::{MarketAsset, PriceUpdate};
use coinboard_feed::build_snapshot;
use coinboard_signal::MarketClassifier;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Execute one task.
pub fn execute(task: OffloadTask, classifier: &MarketClassifier) -> Result<TaskResult, String> {
    match task {
        OffloadTask::MergePriceUpdate {
            mut assets,
            updates,
        } => {
            merge_price_updates(&mut assets, &updates);
            let classification = classifier.classify(&assets);
            Ok(TaskResult::Merged {
                assets,
                classification,
            })
        }
        OffloadTask::SortFilter {
            assets,
            sort_key,
            descending,
            filter,
            limit,
        } => Ok(TaskResult::Sorted {
            assets: sort_filter(assets, sort_key, descending, filter.as_deref(), limit),
        }),
        OffloadTask::Classify { assets } => Ok(TaskResult::Classified {
            classification: classifier.classify(&assets),
        }),
        OffloadTask::AggregateBook {
            update,
            previous,
            depth_limit,
        } => {
            if depth_limit == 0 {
                return Err("depthLimit must be positive".to_string());
            }
            if let Some(prev) = &previous {
                if prev.symbol != update.symbol {
                    return Err(format!(
                        "previous snapshot is for {}, update is for {}",
                        prev.symbol, update.symbol
                    ));
                }
            }
            Ok(TaskResult::Book {
                snapshot: build_snapshot(&update, previous.as_ref(), depth_limit),
            })
        }
    }
}

/// Handle one raw request envelope and produce the reply envelope.
///
/// Returns `None` when the message carries no usable correlation id, since
/// there is nobody to reply to.
pub fn handle_message(text: &str, classifier: &MarketClassifier) -> Option<OffloadReply> {
    match serde_json::from_str::<OffloadRequest>(text) {
        Ok(request) => {
            let op = request.task.op();
            let reply = match execute(request.task, classifier) {
                Ok(result) => OffloadReply::ok(request.correlation_id, result),
                Err(message) => {
                    debug!(op, error = %message, "Task reported error");
                    OffloadReply::error(request.correlation_id, message)
                }
            };
            Some(reply)
        }
        Err(e) => {
            let correlation_id = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("correlationId")?.as_str().map(str::to_string));
            match correlation_id {
                Some(id) => Some(OffloadReply::error(id, format!("invalid request: {e}"))),
                None => {
                    warn!(error = %e, "Dropping request without correlationId");
                    None
                }
            }
        }
    }
}

/// Apply live ticks to the asset list in place.
///
/// Symbols match case-insensitively; when several ticks target one symbol the
/// last one wins. List order is preserved.
pub fn merge_price_updates(assets: &mut [MarketAsset], updates: &[PriceUpdate]) {
    if updates.is_empty() {
        return;
    }

    let latest: HashMap<String, &PriceUpdate> = updates
        .iter()
        .map(|u| (u.symbol.to_ascii_uppercase(), u))
        .collect();

    for asset in assets.iter_mut() {
        if let Some(update) = latest.get(&asset.symbol.to_ascii_uppercase()) {
            asset.apply_update(update);
        }
    }
}

/// Filter, sort and truncate an asset list.
///
/// The filter is a case-insensitive substring match on symbol or name. The
/// sort is stable; non-finite values and missing options sort last in
/// either direction.
pub fn sort_filter(
    assets: Vec<MarketAsset>,
    key: SortKey,
    descending: bool,
    filter: Option<&str>,
    limit: Option<usize>,
) -> Vec<MarketAsset> {
    let needle = filter
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_lowercase);

    let mut out: Vec<MarketAsset> = match needle {
        Some(needle) => assets
            .into_iter()
            .filter(|a| {
                a.symbol.to_lowercase().contains(&needle) || a.name.to_lowercase().contains(&needle)
            })
            .collect(),
        None => assets,
    };

    out.sort_by(|a, b| compare(a, b, key, descending));

    if let Some(limit) = limit {
        out.truncate(limit);
    }
    out
}

fn compare(a: &MarketAsset, b: &MarketAsset, key: SortKey, descending: bool) -> Ordering {
    if key == SortKey::Symbol {
        let ord = a.symbol.cmp(&b.symbol);
        return if descending { ord.reverse() } else { ord };
    }

    let (x, y) = (sort_value(a, key), sort_value(b, key));
    match (x, y) {
        (Some(x), Some(y)) => {
            let ord = x.total_cmp(&y);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn sort_value(asset: &MarketAsset, key: SortKey) -> Option<f64> {
    let value = match key {
        SortKey::MarketCap => Some(asset.market_cap),
        SortKey::Price => Some(asset.price),
        SortKey::Change24h => Some(asset.change_percent_24h),
        SortKey::Change7d => asset.change_percent_7d,
        SortKey::Volume => Some(asset.volume_24h),
        SortKey::Rank => asset.rank.map(f64::from),
        SortKey::Symbol => None,
    };
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReplyOutcome;
    use coinboard_core::{BookUpdate, MarketRegime, PriceLevel};
    use serde_json::json;

    fn asset(symbol: &str, name: &str, market_cap: f64, change: f64) -> MarketAsset {
        let mut asset = MarketAsset::new(symbol.to_lowercase(), symbol)
            .with_price(10.0)
            .with_market_cap(market_cap)
            .with_change(change, None);
        asset.name = name.to_string();
        asset
    }

    fn sample() -> Vec<MarketAsset> {
        vec![
            asset("BTC", "Bitcoin", 1000.0, 1.0),
            asset("ETH", "Ethereum", 500.0, -2.0),
            asset("SOL", "Solana", 100.0, 8.0),
            asset("BCH", "Bitcoin Cash", 50.0, f64::NAN),
        ]
    }

    #[test]
    fn test_sort_by_change_descending() {
        let out = sort_filter(sample(), SortKey::Change24h, true, None, None);
        let symbols: Vec<&str> = out.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["SOL", "BTC", "ETH", "BCH"]);
    }

    #[test]
    fn test_filter_matches_symbol_or_name() {
        let out = sort_filter(sample(), SortKey::MarketCap, true, Some("bitcoin"), None);
        let symbols: Vec<&str> = out.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "BCH"]);

        let out = sort_filter(sample(), SortKey::Symbol, false, Some("  "), Some(2));
        let symbols: Vec<&str> = out.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BCH", "BTC"]);
    }

    #[test]
    fn test_merge_price_updates_last_wins() {
        let mut assets = sample();
        let updates = vec![
            PriceUpdate::new("btc", 11.0),
            PriceUpdate::new("BTC", 12.0),
            PriceUpdate::new("DOGE", 1.0),
        ];
        merge_price_updates(&mut assets, &updates);

        assert_eq!(assets[0].price, 12.0);
        assert!((assets[0].market_cap - 1200.0).abs() < 1e-9);
        assert_eq!(assets[1].price, 10.0);
        assert_eq!(assets[0].symbol, "BTC");
    }

    #[test]
    fn test_handle_message_classify() {
        let classifier = MarketClassifier::default();
        let text = json!({"type": "classify", "correlationId": "c-1", "assets": []}).to_string();

        let reply = handle_message(&text, &classifier).unwrap();
        assert_eq!(reply.correlation_id, "c-1");
        match reply.outcome {
            ReplyOutcome::Result(TaskResult::Classified { classification }) => {
                assert_eq!(classification.regime, MarketRegime::Crab);
            }
            other => panic!("Unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_handle_message_bad_payload_replies_error() {
        let classifier = MarketClassifier::default();
        let text = json!({"type": "classify", "correlationId": "c-2", "assets": 7}).to_string();

        let reply = handle_message(&text, &classifier).unwrap();
        assert_eq!(reply.correlation_id, "c-2");
        assert!(matches!(reply.outcome, ReplyOutcome::Error(_)));
    }

    #[test]
    fn test_handle_message_without_id_dropped() {
        let classifier = MarketClassifier::default();
        assert!(handle_message("not json", &classifier).is_none());
        assert!(handle_message(r#"{"type":"classify"}"#, &classifier).is_none());
    }

    #[test]
    fn test_aggregate_book_symbol_mismatch() {
        let classifier = MarketClassifier::default();
        let first = BookUpdate::new(
            "BTCUSDT",
            vec![PriceLevel::new(100.0, 1.0)],
            vec![PriceLevel::new(101.0, 1.0)],
        );
        let snapshot = match execute(
            OffloadTask::AggregateBook {
                update: first,
                previous: None,
                depth_limit: 20,
            },
            &classifier,
        ) {
            Ok(TaskResult::Book { snapshot }) => snapshot,
            other => panic!("Unexpected: {other:?}"),
        };

        let other = BookUpdate::new("ETHUSDT", vec![], vec![]);
        let result = execute(
            OffloadTask::AggregateBook {
                update: other,
                previous: Some(snapshot),
                depth_limit: 20,
            },
            &classifier,
        );
        assert!(result.is_err());
    }
}
