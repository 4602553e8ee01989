//! Executor lifecycle.
//!
//! The registry is owned by the application context and lends out
//! reference-counted handles. At most one executor is live; it is booted by
//! the first `acquire` and torn down when the last handle is dropped. The
//! registry only holds a weak reference so it never keeps the worker alive.

use crate::config::OffloadConfig;
use crate::error::OffloadResult;
use crate::executor::OffloadExecutor;
use coinboard_signal::MarketClassifier;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

pub struct OffloadRegistry {
    config: OffloadConfig,
    classifier: MarketClassifier,
    live: Mutex<Weak<OffloadExecutor>>,
    boots: AtomicU64,
}

impl OffloadRegistry {
    pub fn new(config: OffloadConfig, classifier: MarketClassifier) -> Self {
        Self {
            config,
            classifier,
            live: Mutex::new(Weak::new()),
            boots: AtomicU64::new(0),
        }
    }

    /// Get a handle to the live executor, booting one if none is live.
    pub fn acquire(&self) -> OffloadResult<OffloadHandle> {
        let mut live = self.live.lock();
        if let Some(executor) = live.upgrade() {
            return Ok(OffloadHandle { executor });
        }

        let executor = Arc::new(OffloadExecutor::start(
            &self.config,
            self.classifier.clone(),
        )?);
        *live = Arc::downgrade(&executor);
        let boots = self.boots.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(boots, "Offload executor booted");

        Ok(OffloadHandle { executor })
    }

    pub fn is_live(&self) -> bool {
        self.live.lock().strong_count() > 0
    }

    /// Number of outstanding handles.
    pub fn handle_count(&self) -> usize {
        self.live.lock().strong_count()
    }

    /// Number of times an executor has been booted.
    pub fn boot_count(&self) -> u64 {
        self.boots.load(Ordering::SeqCst)
    }
}

/// Shared reference to the live executor.
#[derive(Clone)]
pub struct OffloadHandle {
    executor: Arc<OffloadExecutor>,
}

impl Deref for OffloadHandle {
    type Target = OffloadExecutor;

    fn deref(&self) -> &Self::Target {
        &self.executor
    }
}

impl std::fmt::Debug for OffloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffloadHandle")
            .field("refs", &Arc::strong_count(&self.executor))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinboard_core::AdvisorySignal;
    use std::time::Duration;

    fn registry() -> OffloadRegistry {
        OffloadRegistry::new(OffloadConfig::default(), MarketClassifier::default())
    }

    #[test]
    fn test_single_live_executor() {
        let registry = registry();
        assert!(!registry.is_live());

        let a = registry.acquire().unwrap();
        let b = registry.acquire().unwrap();
        let c = a.clone();

        assert_eq!(registry.boot_count(), 1);
        assert_eq!(registry.handle_count(), 3);
        assert!(std::ptr::eq(&*a, &*b));
        drop(c);
        assert_eq!(registry.handle_count(), 2);
    }

    #[tokio::test]
    async fn test_teardown_after_last_handle_and_reboot() {
        let registry = registry();

        let a = registry.acquire().unwrap();
        let b = registry.acquire().unwrap();
        let alive = a.worker_alive();

        drop(a);
        assert!(registry.is_live());
        assert_eq!(b.classify(vec![]).await.unwrap().signal, AdvisorySignal::Neutral);

        drop(b);
        assert!(!registry.is_live());
        for _ in 0..100 {
            if !alive.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!alive.load(Ordering::SeqCst));

        let c = registry.acquire().unwrap();
        assert_eq!(registry.boot_count(), 2);
        assert!(c.classify(vec![]).await.is_ok());
    }
}
