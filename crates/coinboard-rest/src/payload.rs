//! Third-party payload parsers.
//!
//! Upstream JSON is loosely typed: numbers arrive as numbers or strings,
//! fields go missing or are `null`. Each parser accepts exactly one payload
//! shape, defaults every optional field deterministically and only fails
//! when the top-level shape is wrong. Individual malformed entries are
//! skipped.

use crate::error::{RestError, RestResult};
use coinboard_core::{MarketAsset, PriceUpdate};
use serde_json::Value;
use tracing::debug;

/// Parse a CoinGecko `/coins/markets` array.
///
/// Entries without an `id` or `symbol` are skipped. Symbols are upper-cased.
/// The 24h change prefers `price_change_percentage_24h_in_currency` and
/// falls back to `price_change_percentage_24h`.
pub fn parse_market_list(value: &Value) -> RestResult<Vec<MarketAsset>> {
    let entries = value
        .as_array()
        .ok_or_else(|| RestError::Payload("market list is not an array".to_string()))?;

    let mut assets = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let (Some(id), Some(symbol)) = (str_field(entry, "id"), str_field(entry, "symbol")) else {
            debug!(idx, "Skipping market entry without id/symbol");
            continue;
        };

        let change_24h = num_field(entry, "price_change_percentage_24h_in_currency")
            .or_else(|| num_field(entry, "price_change_percentage_24h"))
            .unwrap_or(0.0);

        assets.push(MarketAsset {
            id: id.to_string(),
            symbol: symbol.to_ascii_uppercase(),
            name: str_field(entry, "name").unwrap_or(symbol).to_string(),
            price: num_field(entry, "current_price").unwrap_or(0.0),
            change_percent_24h: change_24h,
            change_percent_7d: num_field(entry, "price_change_percentage_7d_in_currency"),
            market_cap: num_field(entry, "market_cap").unwrap_or(0.0),
            volume_24h: num_field(entry, "total_volume").unwrap_or(0.0),
            rank: entry
                .get("market_cap_rank")
                .and_then(Value::as_u64)
                .and_then(|r| u32::try_from(r).ok()),
        });
    }
    Ok(assets)
}

/// Parse Binance 24h ticker statistics into price updates.
///
/// Accepts the REST `/ticker/24hr` array (or a single object) and the
/// stream `24hrTicker` event shape. Only symbols quoted in `quote_asset`
/// are kept; the quote suffix is stripped (`BTCUSDT` becomes `BTC`).
pub fn parse_ticker_updates(value: &Value, quote_asset: &str) -> RestResult<Vec<PriceUpdate>> {
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => {
            return Err(RestError::Payload(
                "ticker payload is neither an array nor an object".to_string(),
            ))
        }
    };

    let quote = quote_asset.to_ascii_uppercase();
    let mut updates = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(pair) = str_field(entry, "symbol").or_else(|| str_field(entry, "s")) else {
            continue;
        };
        let pair = pair.to_ascii_uppercase();
        let Some(base) = pair.strip_suffix(quote.as_str()).filter(|b| !b.is_empty()) else {
            continue;
        };
        let Some(price) = num_field(entry, "lastPrice").or_else(|| num_field(entry, "c")) else {
            continue;
        };
        if !price.is_finite() || price <= 0.0 {
            continue;
        }

        updates.push(PriceUpdate {
            symbol: base.to_string(),
            price,
            change_percent_24h: num_field(entry, "priceChangePercent")
                .or_else(|| num_field(entry, "P")),
        });
    }
    Ok(updates)
}

fn str_field<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Number or numeric string; non-finite values count as missing.
fn num_field(entry: &Value, key: &str) -> Option<f64> {
    let value = match entry.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_market_list() {
        let payload = json!([
            {
                "id": "bitcoin",
                "symbol": "btc",
                "name": "Bitcoin",
                "current_price": 65000.5,
                "market_cap": 1.28e12,
                "market_cap_rank": 1,
                "total_volume": 3.1e10,
                "price_change_percentage_24h": 2.5,
                "price_change_percentage_24h_in_currency": 2.6,
                "price_change_percentage_7d_in_currency": -1.2
            },
            {
                "id": "ethereum",
                "symbol": "eth",
                "current_price": "3200.1",
                "market_cap": null,
                "price_change_percentage_24h": null
            }
        ]);

        let assets = parse_market_list(&payload).unwrap();
        assert_eq!(assets.len(), 2);

        let btc = &assets[0];
        assert_eq!(btc.symbol, "BTC");
        assert_eq!(btc.change_percent_24h, 2.6);
        assert_eq!(btc.change_percent_7d, Some(-1.2));
        assert_eq!(btc.rank, Some(1));

        let eth = &assets[1];
        assert_eq!(eth.name, "eth");
        assert_eq!(eth.price, 3200.1);
        assert_eq!(eth.market_cap, 0.0);
        assert_eq!(eth.change_percent_24h, 0.0);
        assert_eq!(eth.change_percent_7d, None);
        assert_eq!(eth.rank, None);
    }

    #[test]
    fn test_market_list_skips_bad_entries() {
        let payload = json!([null, {"symbol": "x"}, {"id": "a", "symbol": "a"}, 42]);
        let assets = parse_market_list(&payload).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].id, "a");
    }

    #[test]
    fn test_market_list_wrong_shape() {
        assert!(matches!(
            parse_market_list(&json!({"error": "rate limited"})),
            Err(RestError::Payload(_))
        ));
    }

    #[test]
    fn test_parse_rest_tickers() {
        let payload = json!([
            {"symbol": "BTCUSDT", "lastPrice": "65000.00", "priceChangePercent": "2.100"},
            {"symbol": "ETHBTC", "lastPrice": "0.05", "priceChangePercent": "0.1"},
            {"symbol": "SOLUSDT", "lastPrice": "not a number"},
            {"symbol": "USDT", "lastPrice": "1.0"},
            {"symbol": "DOGEUSDT", "lastPrice": "0.12"}
        ]);

        let updates = parse_ticker_updates(&payload, "USDT").unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].symbol, "BTC");
        assert_eq!(updates[0].price, 65000.0);
        assert_eq!(updates[0].change_percent_24h, Some(2.1));
        assert_eq!(updates[1].symbol, "DOGE");
        assert_eq!(updates[1].change_percent_24h, None);
    }

    #[test]
    fn test_parse_stream_ticker() {
        let payload = json!({"e": "24hrTicker", "s": "ETHUSDT", "c": "3200.5", "P": "-1.5"});
        let updates = parse_ticker_updates(&payload, "usdt").unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].symbol, "ETH");
        assert_eq!(updates[0].change_percent_24h, Some(-1.5));
    }

    #[test]
    fn test_ticker_wrong_shape() {
        assert!(matches!(
            parse_ticker_updates(&json!("nope"), "USDT"),
            Err(RestError::Payload(_))
        ));
    }
}
