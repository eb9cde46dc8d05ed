//! # Whaletrack Pipeline
//!
//! The back half of the system: whale-perspective records flow through
//! the two-layer near-duplicate suppressor into the idempotent sink,
//! per-wallet statistics accumulate in the whale registry, and the stage
//! wiring holds it all together with bounded queues and sharded workers.
//!
//! ## Ordering and consistency
//!
//! Events are sequenced once at the fan-in router. After the parallel
//! enrichment and classification pools, a single resequencer restores
//! emission order and routes each record to the shard owning its
//! `(chain, whale)` key. Storage writes happen inside the shard worker,
//! so the dedup lookback always reads its own shard's writes.

#![warn(clippy::all)]

pub mod cleanup;
pub mod dedup;
pub mod error;
pub mod registry;
pub mod sink;
pub mod stages;
pub mod stats;
pub mod storage;

pub use cleanup::{cleanup_duplicates, CleanupReport};
pub use dedup::{DedupDecision, NearDupeDetector};
pub use error::{PipelineError, SinkError, StorageError};
pub use registry::WhaleRegistry;
pub use sink::{RecordSink, SentimentCounters};
pub use stages::{Pipeline, PipelineDeps};
pub use stats::{PipelineStats, StatsSnapshot};
pub use storage::{MemoryStorage, Storage, UpsertOutcome};
