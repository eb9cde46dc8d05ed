//! Storage seam
//!
//! The persistence backend is an external collaborator; the pipeline
//! only relies on the operations here. The contract the dedup layer and
//! the tests depend on:
//!
//! - `upsert` is idempotent on `(chain, tx_hash)` and keeps the
//!   higher-confidence attempt, preserving the earliest `block_time`;
//! - `recent_for_key` serves the dedup lookback ordered newest first.

pub mod memory;

pub use memory::MemoryStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use types::{Chain, WhaleRecord};

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The incoming attempt won on confidence and replaced the row.
    Updated,
    /// The existing row already carried equal or higher confidence.
    KeptExisting,
}

/// Operations the pipeline invokes against persistent storage.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Idempotent write keyed on `(chain, tx_hash)`.
    async fn upsert(&self, record: WhaleRecord) -> Result<UpsertOutcome, StorageError>;

    async fn get(&self, chain: Chain, tx_hash: &str) -> Result<Option<WhaleRecord>, StorageError>;

    /// Recent records for one `(whale, token)` key within `window` of
    /// `around`, newest first, at most `limit` rows.
    async fn recent_for_key(
        &self,
        whale: &str,
        token: &str,
        around: DateTime<Utc>,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<WhaleRecord>, StorageError>;

    /// Replace an existing row with a (differently keyed) record, as one
    /// atomic step of the dedup merge policy.
    async fn replace(
        &self,
        old_chain: Chain,
        old_tx_hash: &str,
        record: WhaleRecord,
    ) -> Result<(), StorageError>;

    async fn delete(&self, chain: Chain, tx_hash: &str) -> Result<bool, StorageError>;

    /// Full scan for offline maintenance (duplicate cleanup).
    async fn scan(&self) -> Result<Vec<WhaleRecord>, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;
}
