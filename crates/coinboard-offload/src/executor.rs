//! Offload executor: one worker thread plus the caller-side dispatch.

use crate::config::OffloadConfig;
use crate::error::{OffloadError, OffloadResult};
use crate::pending::PendingTasks;
use crate::protocol::{OffloadRequest, OffloadTask, SortKey, TaskResult};
use crate::task::handle_message;
use coinboard_core::{BookUpdate, Classification, MarketAsset, OrderBookSnapshot, PriceUpdate};
use coinboard_signal::MarketClassifier;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

const WORKER_THREAD_NAME: &str = "coinboard-offload";

/// Running executor.
///
/// Dropping the executor closes the request channel; the worker drains
/// what it already received and exits.
pub struct OffloadExecutor {
    request_tx: mpsc::UnboundedSender<String>,
    pending: Arc<PendingTasks>,
    worker_alive: Arc<AtomicBool>,
    dispatched: AtomicU64,
    timeout: Duration,
}

impl OffloadExecutor {
    /// Boot a worker thread.
    ///
    /// Does not need a tokio runtime; [`Self::dispatch`] does.
    pub fn start(config: &OffloadConfig, classifier: MarketClassifier) -> OffloadResult<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<String>();
        let pending = Arc::new(PendingTasks::new());
        let worker_alive = Arc::new(AtomicBool::new(true));

        let worker_pending = Arc::clone(&pending);
        let alive = Arc::clone(&worker_alive);
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                worker_loop(request_rx, classifier, &worker_pending);
                worker_pending.cancel_all();
                alive.store(false, Ordering::SeqCst);
            })?;

        info!(timeout_ms = config.timeout_ms, "Offload executor started");

        Ok(Self {
            request_tx,
            pending,
            worker_alive,
            dispatched: AtomicU64::new(0),
            timeout: config.timeout(),
        })
    }

    /// Send a task and wait for its reply.
    pub async fn dispatch(&self, task: OffloadTask) -> OffloadResult<TaskResult> {
        let op = task.op();
        let (correlation_id, rx) = self.pending.register(op);
        let request = OffloadRequest {
            task,
            correlation_id: correlation_id.clone(),
        };

        let text = match serde_json::to_string(&request) {
            Ok(text) => text,
            Err(e) => {
                self.pending.remove(&correlation_id);
                return Err(e.into());
            }
        };

        if self.request_tx.send(text).is_err() {
            self.pending.remove(&correlation_id);
            return Err(OffloadError::Shutdown);
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        trace!(op, %correlation_id, "Task dispatched");

        self.pending
            .wait(&correlation_id, op, rx, self.timeout)
            .await
    }

    pub async fn merge_price_update(
        &self,
        assets: Vec<MarketAsset>,
        updates: Vec<PriceUpdate>,
    ) -> OffloadResult<(Vec<MarketAsset>, Classification)> {
        match self
            .dispatch(OffloadTask::MergePriceUpdate { assets, updates })
            .await?
        {
            TaskResult::Merged {
                assets,
                classification,
            } => Ok((assets, classification)),
            _ => Err(OffloadError::UnexpectedReply("mergePriceUpdate")),
        }
    }

    pub async fn sort_filter(
        &self,
        assets: Vec<MarketAsset>,
        sort_key: SortKey,
        descending: bool,
        filter: Option<String>,
        limit: Option<usize>,
    ) -> OffloadResult<Vec<MarketAsset>> {
        let task = OffloadTask::SortFilter {
            assets,
            sort_key,
            descending,
            filter,
            limit,
        };
        match self.dispatch(task).await? {
            TaskResult::Sorted { assets } => Ok(assets),
            _ => Err(OffloadError::UnexpectedReply("sortFilter")),
        }
    }

    pub async fn classify(&self, assets: Vec<MarketAsset>) -> OffloadResult<Classification> {
        match self.dispatch(OffloadTask::Classify { assets }).await? {
            TaskResult::Classified { classification } => Ok(classification),
            _ => Err(OffloadError::UnexpectedReply("classify")),
        }
    }

    pub async fn aggregate_book(
        &self,
        update: BookUpdate,
        previous: Option<OrderBookSnapshot>,
        depth_limit: usize,
    ) -> OffloadResult<OrderBookSnapshot> {
        let task = OffloadTask::AggregateBook {
            update,
            previous,
            depth_limit,
        };
        match self.dispatch(task).await? {
            TaskResult::Book { snapshot } => Ok(snapshot),
            _ => Err(OffloadError::UnexpectedReply("aggregateBook")),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Shared flag cleared when the worker thread exits.
    pub fn worker_alive(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.worker_alive)
    }
}

impl Drop for OffloadExecutor {
    fn drop(&mut self) {
        debug!(
            dispatched = self.dispatched.load(Ordering::Relaxed),
            "Offload executor shutting down"
        );
    }
}

fn worker_loop(
    mut request_rx: mpsc::UnboundedReceiver<String>,
    classifier: MarketClassifier,
    pending: &PendingTasks,
) {
    while let Some(text) = request_rx.blocking_recv() {
        let Some(reply) = handle_message(&text, &classifier) else {
            continue;
        };
        match serde_json::to_string(&reply) {
            Ok(reply_text) => {
                pending.route_reply(&reply_text);
            }
            Err(e) => {
                warn!(correlation_id = %reply.correlation_id, error = %e, "Failed to encode reply");
            }
        }
    }
    debug!("Offload worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinboard_core::{DeltaKind, MarketRegime, PriceLevel};

    fn executor() -> OffloadExecutor {
        OffloadExecutor::start(&OffloadConfig::default(), MarketClassifier::default()).unwrap()
    }

    fn surge_assets() -> Vec<MarketAsset> {
        (0..20)
            .map(|i| {
                MarketAsset::new(format!("coin-{i}"), format!("C{i}"))
                    .with_price(1.0)
                    .with_change(6.0, None)
                    .with_market_cap(1e9)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_classify_round_trip() {
        let exec = executor();
        let classification = exec.classify(surge_assets()).await.unwrap();
        assert_eq!(classification.regime, MarketRegime::Surge);
        assert_eq!(exec.pending_count(), 0);
        assert_eq!(exec.dispatched_count(), 1);
    }

    #[tokio::test]
    async fn test_aggregate_book_round_trip() {
        let exec = executor();
        let first = BookUpdate::new(
            "BTCUSDT",
            vec![PriceLevel::new(100.0, 5.0)],
            vec![PriceLevel::new(101.0, 1.0)],
        );
        let snap1 = exec.aggregate_book(first, None, 20).await.unwrap();

        let second = BookUpdate::new(
            "BTCUSDT",
            vec![PriceLevel::new(100.0, 8.0)],
            vec![PriceLevel::new(101.0, 1.0)],
        );
        let snap2 = exec.aggregate_book(second, Some(snap1), 20).await.unwrap();
        assert_eq!(snap2.bids[0].delta, DeltaKind::Up);
        assert_eq!(snap2.asks[0].delta, DeltaKind::Same);
    }

    #[tokio::test]
    async fn test_task_error_surfaces() {
        let exec = executor();
        let update = BookUpdate::new("BTCUSDT", vec![], vec![]);
        let err = exec.aggregate_book(update, None, 0).await.unwrap_err();
        assert!(matches!(err, OffloadError::Task(_)));
        assert!(!err.is_timeout());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_no_cross_resolution() {
        let exec = Arc::new(executor());

        let mut handles = Vec::new();
        for i in 0..32u32 {
            let exec = Arc::clone(&exec);
            handles.push(tokio::spawn(async move {
                let assets: Vec<MarketAsset> = (0..=i)
                    .map(|j| {
                        MarketAsset::new(format!("coin-{j}"), format!("C{j}"))
                            .with_market_cap(1e9 - j as f64)
                    })
                    .collect();
                let sorted = exec
                    .sort_filter(assets, SortKey::MarketCap, false, None, None)
                    .await
                    .unwrap();
                (i, sorted)
            }));
        }

        for handle in handles {
            let (i, sorted) = handle.await.unwrap();
            // Each caller gets back exactly its own list.
            assert_eq!(sorted.len(), i as usize + 1);
            assert_eq!(sorted[0].symbol, format!("C{i}"));
        }
        assert_eq!(exec.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_exits_on_drop() {
        let exec = executor();
        let alive = exec.worker_alive();
        assert!(alive.load(Ordering::SeqCst));

        drop(exec);
        for _ in 0..100 {
            if !alive.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!alive.load(Ordering::SeqCst));
    }
}
