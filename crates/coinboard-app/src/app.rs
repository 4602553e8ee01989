//! Main application orchestration.
//!
//! Coordinates all components:
//! - One reconnecting depth feed per symbol
//! - Off-thread book aggregation and market classification
//! - Market list polling through the request cache
//! - Periodic status reporting (logs and metrics)
//!
//! All long-lived state lives in [`AppContext`]; nothing is kept in
//! module-level globals apart from the metric registry.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use coinboard_core::{BookUpdate, Classification, MarketAsset, OrderBookSnapshot};
use coinboard_feed::{BookStore, DepthMessageParser, FeedError};
use coinboard_offload::{OffloadError, OffloadHandle, OffloadRegistry, SortKey};
use coinboard_rest::{parse_market_list, parse_ticker_updates, RequestCache, RestClient};
use coinboard_signal::MarketClassifier;
use coinboard_telemetry::Metrics;
use coinboard_ws::{ConnectionState, FeedClient, FeedEvent, MessageDecoder};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Time allowed for tasks to wind down after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Decodes depth frames for one symbol and reports parser drops.
pub struct DepthDecoder {
    symbol: String,
    parser: DepthMessageParser,
}

impl DepthDecoder {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_ascii_uppercase(),
            parser: DepthMessageParser::for_symbol(symbol),
        }
    }
}

impl MessageDecoder for DepthDecoder {
    type Output = BookUpdate;
    type Error = FeedError;

    fn decode(&mut self, text: &str) -> Result<Option<BookUpdate>, FeedError> {
        let levels_before = self.parser.stats().dropped_levels();
        let result = self.parser.parse(text);

        let dropped_levels = self.parser.stats().dropped_levels() - levels_before;
        Metrics::parse_dropped(&self.symbol, "level", dropped_levels);
        if result.is_err() {
            Metrics::parse_dropped(&self.symbol, "message", 1);
        }
        result
    }
}

/// Latest classified market list.
#[derive(Debug, Clone, Default)]
pub struct MarketBoard {
    pub assets: Vec<MarketAsset>,
    pub classification: Classification,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Shared application state.
pub struct AppContext {
    config: AppConfig,
    registry: OffloadRegistry,
    cache: RequestCache<RestClient>,
    books: BookStore,
    board: RwLock<MarketBoard>,
    shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let classifier = MarketClassifier::new(config.classifier.clone())?;
        let registry = OffloadRegistry::new(config.offload.clone(), classifier);
        let client = RestClient::with_timeout(config.rest.timeout())?;
        let cache = RequestCache::new(client, config.rest.min_interval());
        let books = BookStore::new(config.feed.depth_limit);

        Ok(Self {
            config,
            registry,
            cache,
            books,
            board: RwLock::new(MarketBoard::default()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn books(&self) -> &BookStore {
        &self.books
    }

    pub fn registry(&self) -> &OffloadRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &RequestCache<RestClient> {
        &self.cache
    }

    /// Snapshot of the latest market board.
    pub fn market_board(&self) -> MarketBoard {
        self.board.read().clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Aggregate a coalesced update off-thread and commit it as the
    /// symbol's current book.
    pub async fn apply_book_update(
        &self,
        handle: &OffloadHandle,
        update: BookUpdate,
    ) -> AppResult<OrderBookSnapshot> {
        let symbol = update.symbol.clone();
        let previous = self.books.current(&symbol);

        let started = Instant::now();
        let snapshot = handle
            .aggregate_book(update, previous, self.config.feed.depth_limit)
            .await
            .map_err(|e| {
                record_offload_error("aggregateBook", &e);
                e
            })?;
        Metrics::offload_latency("aggregateBook", elapsed_ms(started));

        if self.shutdown.is_cancelled() {
            return Err(AppError::Shutdown);
        }

        self.books.commit(snapshot.clone());
        Metrics::feed_update(&symbol);
        Metrics::book_snapshot(
            &symbol,
            snapshot.spread_percent,
            snapshot.mid_price,
            snapshot.bid_ask_ratio,
        );
        Ok(snapshot)
    }

    /// Fetch the market list and tickers, merge and classify them.
    ///
    /// A ticker failure is logged and the list is classified without price
    /// updates; a market list failure fails the refresh.
    pub async fn refresh_markets(&self, handle: &OffloadHandle) -> AppResult<Classification> {
        let markets = self
            .fetch_json("markets", &self.config.rest.markets_url)
            .await?;
        let assets = parse_market_list(&markets)?;

        let updates = match self.fetch_json("tickers", &self.config.rest.tickers_url).await {
            Ok(tickers) => parse_ticker_updates(&tickers, &self.config.rest.quote_asset)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Ticker payload rejected");
                    Vec::new()
                }),
            Err(AppError::Shutdown) => return Err(AppError::Shutdown),
            Err(e) => {
                warn!(error = %e, "Ticker fetch failed, classifying without updates");
                Vec::new()
            }
        };

        let started = Instant::now();
        let (assets, classification) = handle
            .merge_price_update(assets, updates)
            .await
            .map_err(|e| {
                record_offload_error("mergePriceUpdate", &e);
                e
            })?;
        Metrics::offload_latency("mergePriceUpdate", elapsed_ms(started));

        let top_n = self.config.dashboard.top_movers;
        let movers = if top_n > 0 {
            handle
                .sort_filter(assets.clone(), SortKey::Change24h, true, None, Some(top_n))
                .await
                .map_err(|e| {
                    record_offload_error("sortFilter", &e);
                    e
                })?
        } else {
            Vec::new()
        };

        if self.shutdown.is_cancelled() {
            return Err(AppError::Shutdown);
        }

        Metrics::market_classification(
            classification.regime.as_str(),
            classification.signal.as_str(),
            classification.score,
            classification.breadth,
            classification.weighted_change,
        );
        info!(
            regime = %classification.regime.as_str(),
            signal = %classification.signal.as_str(),
            score = classification.score,
            breadth = classification.breadth,
            weighted_change = classification.weighted_change,
            assets = assets.len(),
            top_movers = ?movers
                .iter()
                .map(|a| (a.symbol.as_str(), a.change_percent_24h))
                .collect::<Vec<_>>(),
            "Market classified"
        );

        *self.board.write() = MarketBoard {
            assets,
            classification,
            updated_at: Some(Utc::now()),
        };
        Ok(classification)
    }

    /// Log one status line per book and refresh staleness gauges.
    pub fn report_status(&self) {
        let threshold = self.config.dashboard.stale_threshold_ms;
        for symbol in self.books.symbols() {
            let Some(snapshot) = self.books.current(&symbol) else {
                continue;
            };
            let age_ms = self.books.age_ms(&symbol).unwrap_or(0);
            let stale = self.books.is_stale(&symbol, threshold);
            Metrics::book_age(&symbol, age_ms, stale);

            if stale {
                warn!(%symbol, age_ms, "Book is stale");
            }
            info!(
                %symbol,
                mid = snapshot.mid_price,
                spread_percent = snapshot.spread_percent,
                bid_ask_ratio = snapshot.bid_ask_ratio,
                bid_levels = snapshot.bids.len(),
                ask_levels = snapshot.asks.len(),
                updates = self.books.update_count(&symbol),
                age_ms,
                "Book status"
            );
        }

        let cache = self.cache.stats();
        debug!(
            hits = cache.hits,
            joins = cache.joins,
            network_calls = cache.network_calls,
            failures = cache.failures,
            entries = cache.entries,
            offload_live = self.registry.is_live(),
            "Runtime status"
        );

        match self.export_metrics() {
            Ok(Some(bytes)) => debug!(bytes, "Metrics exported"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Metrics export failed"),
        }
    }

    /// Write the Prometheus text exposition to `dashboard.metrics_path`.
    ///
    /// The file is replaced by rename so scrapers never read a partial
    /// write. Returns the bytes written, or `None` when no path is set.
    pub fn export_metrics(&self) -> AppResult<Option<usize>> {
        let Some(path) = self.config.dashboard.metrics_path.as_deref() else {
            return Ok(None);
        };
        let text = Metrics::gather_text()?;
        let tmp = format!("{path}.tmp");
        std::fs::write(&tmp, &text)?;
        std::fs::rename(&tmp, path)?;
        Ok(Some(text.len()))
    }

    async fn fetch_json(&self, endpoint: &'static str, url: &str) -> AppResult<Arc<Value>> {
        let result = self
            .cache
            .fetch(url, self.config.rest.cache_ttl(), &self.shutdown)
            .await;
        match result {
            Ok(value) => {
                Metrics::rest_request(endpoint, true);
                Ok(value)
            }
            Err(coinboard_rest::RestError::Cancelled) => Err(AppError::Shutdown),
            Err(e) => {
                Metrics::rest_request(endpoint, false);
                Err(e.into())
            }
        }
    }
}

fn record_offload_error(op: &str, error: &OffloadError) {
    let kind = match error {
        OffloadError::Timeout { .. } => "timeout",
        OffloadError::Task(_) => "task",
        _ => "other",
    };
    Metrics::offload_error(op, kind);
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Main application.
pub struct Application {
    ctx: Arc<AppContext>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        Ok(Self {
            ctx: Arc::new(AppContext::new(config)?),
        })
    }

    pub fn context(&self) -> Arc<AppContext> {
        Arc::clone(&self.ctx)
    }

    /// Request shutdown; `run` returns once tasks have wound down.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.ctx.shutdown.cancel();
    }

    /// Run until [`Application::shutdown`] is called.
    pub async fn run(&self) -> AppResult<()> {
        // Fail fast if the worker thread cannot start.
        let handle = self.ctx.registry.acquire()?;

        info!(
            symbols = ?self.ctx.config.feed.symbols,
            depth_limit = self.ctx.config.feed.depth_limit,
            "Starting coinboard"
        );

        let mut tasks = JoinSet::new();
        for symbol in &self.ctx.config.feed.symbols {
            tasks.spawn(run_feed(
                Arc::clone(&self.ctx),
                handle.clone(),
                symbol.clone(),
            ));
        }
        tasks.spawn(poll_markets(Arc::clone(&self.ctx), handle.clone()));
        tasks.spawn(report_status(Arc::clone(&self.ctx)));
        drop(handle);

        self.ctx.shutdown.cancelled().await;
        let aborted = self.ctx.cache.abort_all();
        if aborted > 0 {
            info!(aborted, "Aborted in-flight REST requests");
        }

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "Task panicked");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "Tasks did not stop in time, aborting");
            tasks.abort_all();
        }

        info!(offload_live = self.ctx.registry.is_live(), "Application stopped");
        Ok(())
    }
}

async fn run_feed(ctx: Arc<AppContext>, handle: OffloadHandle, symbol: String) {
    let config = ctx.config.feed.client_config(&symbol);
    let decoder = DepthDecoder::new(&symbol);
    let (client, mut events) = match FeedClient::with_token(config, decoder, ctx.shutdown_token())
    {
        Ok(pair) => pair,
        Err(e) => {
            error!(%symbol, error = %e, "Failed to create feed client");
            return;
        }
    };
    let client = Arc::new(client);

    info!(%symbol, url = %client.config().url, "Starting depth feed");
    let mut runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run().await })
    };

    let mut coalesced_seen = 0;
    let outcome = loop {
        tokio::select! {
            // Events are drained first so a final GaveUp is never lost.
            biased;
            Some(event) = events.recv() => match event {
                FeedEvent::StateChanged(state) => {
                    Metrics::feed_state_set(&symbol, state.as_str());
                    if state == ConnectionState::Connected && client.stats().connects > 1 {
                        Metrics::feed_reconnect(&symbol);
                    }
                }
                FeedEvent::Update(update) => {
                    let coalesced = client.stats().coalesced;
                    Metrics::feed_coalesced(&symbol, coalesced - coalesced_seen);
                    coalesced_seen = coalesced;

                    match ctx.apply_book_update(&handle, update).await {
                        Ok(_) | Err(AppError::Shutdown) => {}
                        Err(e) => warn!(%symbol, error = %e, "Dropping book update"),
                    }
                }
                FeedEvent::GaveUp { attempts } => {
                    Metrics::feed_gave_up(&symbol);
                    error!(%symbol, attempts, "Feed gave up reconnecting");
                }
            },
            result = &mut runner => break result,
        }
    };

    match outcome {
        Ok(Ok(())) => info!(%symbol, "Depth feed stopped"),
        Ok(Err(e)) => warn!(%symbol, error = %e, "Depth feed ended"),
        Err(e) => error!(%symbol, error = %e, "Depth feed task failed"),
    }
}

async fn poll_markets(ctx: Arc<AppContext>, handle: OffloadHandle) {
    let mut interval = tokio::time::interval(ctx.config.rest.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            _ = interval.tick() => {
                match ctx.refresh_markets(&handle).await {
                    Ok(_) | Err(AppError::Shutdown) => {}
                    Err(e) => warn!(error = %e, "Market refresh failed"),
                }
            }
        }
    }
    debug!("Market poller stopped");
}

async fn report_status(ctx: Arc<AppContext>) {
    let mut interval = tokio::time::interval(ctx.config.dashboard.status_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately, before any book exists.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            _ = interval.tick() => ctx.report_status(),
        }
    }
    debug!("Status reporter stopped");
}
