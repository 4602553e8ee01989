//! Worker envelope.
//!
//! Requests are `{"type": <op>, ...payload, "correlationId": <id>}`.
//! Replies are `{"correlationId": <id>, "result": {...}}` or
//! `{"correlationId": <id>, "error": "<message>"}`.

use coinboard_core::{BookUpdate, Classification, MarketAsset, OrderBookSnapshot, PriceUpdate};
use serde::{Deserialize, Serialize};

/// Request envelope sent to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadRequest {
    #[serde(flatten)]
    pub task: OffloadTask,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
}

/// Operations the worker understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OffloadTask {
    /// Merge live ticks into the asset list, then reclassify.
    MergePriceUpdate {
        assets: Vec<MarketAsset>,
        updates: Vec<PriceUpdate>,
    },
    /// Filter by symbol/name substring, sort, then truncate.
    #[serde(rename_all = "camelCase")]
    SortFilter {
        assets: Vec<MarketAsset>,
        sort_key: SortKey,
        #[serde(default)]
        descending: bool,
        #[serde(default)]
        filter: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },
    Classify { assets: Vec<MarketAsset> },
    /// Build a snapshot from a feed update and the previous snapshot.
    #[serde(rename_all = "camelCase")]
    AggregateBook {
        update: BookUpdate,
        #[serde(default)]
        previous: Option<OrderBookSnapshot>,
        depth_limit: usize,
    },
}

impl OffloadTask {
    /// Wire name of the operation.
    pub fn op(&self) -> &'static str {
        match self {
            Self::MergePriceUpdate { .. } => "mergePriceUpdate",
            Self::SortFilter { .. } => "sortFilter",
            Self::Classify { .. } => "classify",
            Self::AggregateBook { .. } => "aggregateBook",
        }
    }
}

/// Column to sort an asset list by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    MarketCap,
    Price,
    Change24h,
    Change7d,
    Volume,
    Rank,
    Symbol,
}

/// Reply envelope sent back by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadReply {
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    #[serde(flatten)]
    pub outcome: ReplyOutcome,
}

impl OffloadReply {
    pub fn ok(correlation_id: impl Into<String>, result: TaskResult) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: ReplyOutcome::Result(result),
        }
    }

    pub fn error(correlation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: ReplyOutcome::Error(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplyOutcome {
    Result(TaskResult),
    Error(String),
}

/// Successful task output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TaskResult {
    Merged {
        assets: Vec<MarketAsset>,
        classification: Classification,
    },
    Sorted {
        assets: Vec<MarketAsset>,
    },
    Classified {
        classification: Classification,
    },
    Book {
        snapshot: OrderBookSnapshot,
    },
}
