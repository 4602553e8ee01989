//! Request cache and rate guard.
//!
//! - A fresh entry (age < ttl) is returned without touching the network.
//! - Concurrent calls for the same key share one in-flight request.
//! - Upstream requests are spaced at least `min_interval` apart.
//! - Failures are never cached; the in-flight marker is always cleared so
//!   the next call retries.
//!
//! Each upstream request runs on its own task, so it completes even when
//! every caller waiting on it has been cancelled. [`RequestCache::abort_all`]
//! aborts whatever is still in flight on teardown.

use crate::error::{RestError, RestResult};
use crate::fetcher::{BoxFuture, Fetcher};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type SharedFetch = Shared<BoxFuture<'static, RestResult<Arc<Value>>>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
    abort: AbortHandle,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<Value>,
    fetched_at: Instant,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    /// Calls that joined an in-flight request.
    pub joins: u64,
    pub network_calls: u64,
    pub failures: u64,
    pub entries: usize,
}

struct Inner<F> {
    fetcher: F,
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, InFlight>,
    /// Send time reserved by the most recent request.
    last_slot: Mutex<Option<Instant>>,
    min_interval: Duration,
    next_id: AtomicU64,
    hits: AtomicU64,
    joins: AtomicU64,
    network_calls: AtomicU64,
    failures: AtomicU64,
}

/// Shared request cache. Cloning is cheap and shares state.
pub struct RequestCache<F: Fetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: Fetcher> Clone for RequestCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Fetcher> RequestCache<F> {
    pub fn new(fetcher: F, min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                last_slot: Mutex::new(None),
                min_interval,
                next_id: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                joins: AtomicU64::new(0),
                network_calls: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Fetch `key` (the request URL), honouring cache freshness and dedup.
    ///
    /// Cancelling `cancel` abandons this caller's wait with
    /// [`RestError::Cancelled`]; other callers joined on the same request
    /// are unaffected.
    pub async fn fetch(
        &self,
        key: &str,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> RestResult<Arc<Value>> {
        if cancel.is_cancelled() {
            return Err(RestError::Cancelled);
        }

        if let Some(value) = self.fresh(key, ttl) {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            trace!(%key, "Cache hit");
            return Ok(value);
        }

        let request = match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                self.inner.joins.fetch_add(1, Ordering::Relaxed);
                trace!(%key, "Joining in-flight request");
                entry.get().fetch.clone()
            }
            Entry::Vacant(entry) => {
                // A request may have completed since the freshness check.
                if let Some(value) = self.fresh(key, ttl) {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                let task = tokio::spawn(Self::request(
                    Arc::clone(&self.inner),
                    key.to_string(),
                    id,
                ));
                let abort = task.abort_handle();
                let request = task.map(join_result).boxed().shared();
                entry.insert(InFlight {
                    id,
                    fetch: request.clone(),
                    abort,
                });
                request
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(%key, "Fetch cancelled");
                Err(RestError::Cancelled)
            }
            result = request => result,
        }
    }

    async fn request(inner: Arc<Inner<F>>, key: String, id: u64) -> RestResult<Arc<Value>> {
        let slot = inner.reserve_slot();
        let now = Instant::now();
        if slot > now {
            trace!(%key, wait_ms = (slot - now).as_millis() as u64, "Spacing request");
            tokio::time::sleep_until(slot).await;
        }

        inner.network_calls.fetch_add(1, Ordering::Relaxed);
        let result = inner.fetcher.get(&key).await.map(Arc::new);

        match &result {
            Ok(value) => {
                inner.entries.insert(
                    key.clone(),
                    CacheEntry {
                        value: Arc::clone(value),
                        fetched_at: Instant::now(),
                    },
                );
            }
            Err(e) => {
                inner.failures.fetch_add(1, Ordering::Relaxed);
                warn!(%key, error = %e, "Upstream request failed");
            }
        }

        inner.in_flight.remove_if(&key, |_, flight| flight.id == id);
        result
    }

    /// Abort every request still in flight.
    ///
    /// Waiting callers resolve with [`RestError::Cancelled`]; nothing is
    /// cached. Returns the number of requests aborted.
    pub fn abort_all(&self) -> usize {
        let keys: Vec<String> = self
            .inner
            .in_flight
            .iter()
            .map(|flight| flight.key().clone())
            .collect();
        let mut aborted = 0;
        for key in keys {
            if let Some((_, flight)) = self.inner.in_flight.remove(&key) {
                flight.abort.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            debug!(aborted, "Aborted in-flight requests");
        }
        aborted
    }

    fn fresh(&self, key: &str, ttl: Duration) -> Option<Arc<Value>> {
        self.inner
            .entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < ttl)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Last successful value regardless of age.
    pub fn cached(&self, key: &str) -> Option<Arc<Value>> {
        self.inner.entries.get(key).map(|e| Arc::clone(&e.value))
    }

    /// Age of the cached value for `key`.
    pub fn age(&self, key: &str) -> Option<Duration> {
        self.inner.entries.get(key).map(|e| e.fetched_at.elapsed())
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            joins: self.inner.joins.load(Ordering::Relaxed),
            network_calls: self.inner.network_calls.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
            entries: self.inner.entries.len(),
        }
    }
}

impl<F> Inner<F> {
    /// Reserve the next send time, at least `min_interval` after the
    /// previous reservation.
    fn reserve_slot(&self) -> Instant {
        let mut last = self.last_slot.lock();
        let now = Instant::now();
        let slot = match *last {
            Some(previous) => (previous + self.min_interval).max(now),
            None => now,
        };
        *last = Some(slot);
        slot
    }
}

fn join_result(joined: Result<RestResult<Arc<Value>>, JoinError>) -> RestResult<Arc<Value>> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(RestError::Cancelled),
        Err(e) => Err(RestError::Task(e.to_string())),
    }
}
