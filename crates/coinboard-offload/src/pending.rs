//! Pending task tracking.
//!
//! Each dispatched request registers a oneshot sender under its correlation
//! id. Replies are routed by id; a reply whose id is not pending (late reply
//! after a timeout, or garbage) is logged and dropped.

use crate::error::{OffloadError, OffloadResult};
use crate::protocol::{OffloadReply, ReplyOutcome, TaskResult};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{trace, warn};
use uuid::Uuid;

type TaskOutcome = Result<TaskResult, String>;

/// A task awaiting its reply.
pub struct PendingTask {
    pub op: &'static str,
    pub created_at: Instant,
    /// Consumed on first completion.
    tx: Option<oneshot::Sender<TaskOutcome>>,
}

impl std::fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTask")
            .field("op", &self.op)
            .field("created_at", &self.created_at)
            .field("has_tx", &self.tx.is_some())
            .finish()
    }
}

/// Correlation-id keyed map of in-flight tasks.
#[derive(Debug, Default)]
pub struct PendingTasks {
    pending: DashMap<String, PendingTask>,
}

impl PendingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task under a fresh correlation id.
    pub fn register(&self, op: &'static str) -> (String, oneshot::Receiver<TaskOutcome>) {
        let correlation_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            correlation_id.clone(),
            PendingTask {
                op,
                created_at: Instant::now(),
                tx: Some(tx),
            },
        );
        (correlation_id, rx)
    }

    /// Complete the task matching the reply. Returns false if no task with
    /// that id is pending.
    pub fn complete(&self, reply: OffloadReply) -> bool {
        let Some((_, mut task)) = self.pending.remove(&reply.correlation_id) else {
            warn!(
                correlation_id = %reply.correlation_id,
                "Reply for unknown correlation id, dropping"
            );
            return false;
        };

        trace!(
            op = task.op,
            elapsed_us = task.created_at.elapsed().as_micros() as u64,
            "Task completed"
        );

        if let Some(tx) = task.tx.take() {
            let outcome = match reply.outcome {
                ReplyOutcome::Result(result) => Ok(result),
                ReplyOutcome::Error(message) => Err(message),
            };
            let _ = tx.send(outcome);
        }
        true
    }

    /// Parse a raw reply envelope and complete the matching task.
    pub fn route_reply(&self, text: &str) -> bool {
        match serde_json::from_str::<OffloadReply>(text) {
            Ok(reply) => self.complete(reply),
            Err(e) => {
                warn!(error = %e, "Malformed reply envelope, dropping");
                false
            }
        }
    }

    /// Wait for a registered task, removing it on timeout.
    ///
    /// A timeout is reported as [`OffloadError::Timeout`], a worker-reported
    /// failure as [`OffloadError::Task`].
    pub async fn wait(
        &self,
        correlation_id: &str,
        op: &'static str,
        rx: oneshot::Receiver<TaskOutcome>,
        timeout: Duration,
    ) -> OffloadResult<TaskResult> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(OffloadError::Task(message)),
            Ok(Err(_)) => Err(OffloadError::Shutdown),
            Err(_) => {
                self.pending.remove(correlation_id);
                Err(OffloadError::Timeout {
                    op,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Drop a pending task without notification.
    pub fn remove(&self, correlation_id: &str) -> bool {
        self.pending.remove(correlation_id).is_some()
    }

    /// Drop every pending task. Waiters observe [`OffloadError::Shutdown`].
    pub fn cancel_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
