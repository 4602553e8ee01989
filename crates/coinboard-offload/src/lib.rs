//! Background computation offload.
//!
//! Book aggregation and market classification run on a dedicated OS thread
//! so bursty feed traffic never stalls the async runtime. Callers exchange
//! JSON envelopes with the worker; each request carries a correlation id and
//! the reply is routed back to exactly one pending caller.
//!
//! ```text
//! caller ──OffloadRequest──▶ worker thread
//!   ▲                          │
//!   └──── PendingTasks ◀───────┘ OffloadReply
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod pending;
pub mod protocol;
pub mod registry;
pub mod task;

pub use config::OffloadConfig;
pub use error::{OffloadError, OffloadResult};
pub use executor::OffloadExecutor;
pub use pending::PendingTasks;
pub use protocol::{OffloadReply, OffloadRequest, OffloadTask, ReplyOutcome, SortKey, TaskResult};
pub use registry::{OffloadHandle, OffloadRegistry};
pub use task::{handle_message, merge_price_updates, sort_filter};
