//! In-memory reference storage
//!
//! Backs tests and single-process deployments. A secondary index per
//! `(whale, token)` key serves the dedup lookback the way the real
//! backend serves it from an indexed query. A failure flag simulates
//! backend outages so degradation paths stay testable.

use crate::error::StorageError;
use crate::storage::{Storage, UpsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use types::{Chain, WhaleRecord};

type PrimaryKey = (Chain, String);

#[derive(Default)]
pub struct MemoryStorage {
    records: DashMap<PrimaryKey, WhaleRecord>,
    /// (whale, token) -> primary keys that ever carried that key.
    key_index: DashMap<(String, String), Vec<PrimaryKey>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a transient error, simulating an
    /// unreachable backend.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Transient("storage unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn index(&self, record: &WhaleRecord) {
        if let Some(key) = record.dedup_key() {
            let mut keys = self.key_index.entry(key).or_default();
            let primary = record.key();
            if !keys.contains(&primary) {
                keys.push(primary);
            }
        }
    }

    fn unindex(&self, record: &WhaleRecord) {
        if let Some(key) = record.dedup_key() {
            if let Some(mut keys) = self.key_index.get_mut(&key) {
                let primary = record.key();
                keys.retain(|k| *k != primary);
            }
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upsert(&self, record: WhaleRecord) -> Result<UpsertOutcome, StorageError> {
        self.check_available()?;
        let key = record.key();
        // DashMap entry keeps the merge atomic per key
        let mut outcome = UpsertOutcome::Inserted;
        match self.records.entry(key) {
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                self.index(&record);
                vacant.insert(record);
            }
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let existing = occupied.get();
                if record.confidence > existing.confidence {
                    let earliest = existing.block_time.min(record.block_time);
                    let mut merged = record;
                    merged.block_time = earliest;
                    self.index(&merged);
                    occupied.insert(merged);
                    outcome = UpsertOutcome::Updated;
                } else {
                    outcome = UpsertOutcome::KeptExisting;
                }
            }
        }
        Ok(outcome)
    }

    async fn get(&self, chain: Chain, tx_hash: &str) -> Result<Option<WhaleRecord>, StorageError> {
        self.check_available()?;
        Ok(self
            .records
            .get(&(chain, tx_hash.to_string()))
            .map(|entry| entry.clone()))
    }

    async fn recent_for_key(
        &self,
        whale: &str,
        token: &str,
        around: DateTime<Utc>,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<WhaleRecord>, StorageError> {
        self.check_available()?;
        let window = chrono::Duration::from_std(window)
            .map_err(|e| StorageError::Fatal(format!("window out of range: {e}")))?;

        let Some(keys) = self
            .key_index
            .get(&(whale.to_string(), token.to_string()))
            .map(|entry| entry.clone())
        else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<WhaleRecord> = keys
            .iter()
            .filter_map(|key| self.records.get(key).map(|entry| entry.clone()))
            .filter(|record| {
                let diff = record.block_time - around;
                diff <= window && diff >= -window
            })
            .collect();
        rows.sort_by(|a, b| b.block_time.cmp(&a.block_time));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn replace(
        &self,
        old_chain: Chain,
        old_tx_hash: &str,
        record: WhaleRecord,
    ) -> Result<(), StorageError> {
        self.check_available()?;
        if let Some((_, old)) = self.records.remove(&(old_chain, old_tx_hash.to_string())) {
            self.unindex(&old);
        }
        self.index(&record);
        self.records.insert(record.key(), record);
        Ok(())
    }

    async fn delete(&self, chain: Chain, tx_hash: &str) -> Result<bool, StorageError> {
        self.check_available()?;
        match self.records.remove(&(chain, tx_hash.to_string())) {
            Some((_, old)) => {
                self.unindex(&old);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self) -> Result<Vec<WhaleRecord>, StorageError> {
        self.check_available()?;
        let mut rows: Vec<WhaleRecord> =
            self.records.iter().map(|entry| entry.clone()).collect();
        rows.sort_by(|a, b| a.block_time.cmp(&b.block_time));
        Ok(rows)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.check_available()?;
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use types::{ClassificationKind, LabelKind};

    fn record(tx_hash: &str, confidence: f64, block_secs: i64) -> WhaleRecord {
        WhaleRecord {
            chain: Chain::Ethereum,
            tx_hash: tx_hash.into(),
            block_time: Utc.timestamp_opt(block_secs, 0).unwrap(),
            whale_address: Some("0xwhale".into()),
            counterparty_address: Some("0xcex".into()),
            counterparty_kind: LabelKind::Cex,
            is_cex_transaction: true,
            classification: ClassificationKind::Buy,
            confidence,
            token_symbol: "USDC".into(),
            usd_value: dec!(100_000),
            from_label: Some("Binance".into()),
            to_label: None,
            evidence: vec!["CEX withdrawal from Binance".into()],
            source_id: "test".into(),
            ingested_at: Utc.timestamp_opt(block_secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_idempotent_keeps_max_confidence() {
        let storage = MemoryStorage::new();
        assert_eq!(
            storage.upsert(record("0xa", 0.80, 100)).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            storage.upsert(record("0xa", 0.90, 100)).await.unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(
            storage.upsert(record("0xa", 0.70, 100)).await.unwrap(),
            UpsertOutcome::KeptExisting
        );

        assert_eq!(storage.count().await.unwrap(), 1);
        let stored = storage.get(Chain::Ethereum, "0xa").await.unwrap().unwrap();
        assert_eq!(stored.confidence, 0.90);
    }

    #[tokio::test]
    async fn test_upsert_preserves_earliest_block_time() {
        let storage = MemoryStorage::new();
        storage.upsert(record("0xa", 0.80, 100)).await.unwrap();
        storage.upsert(record("0xa", 0.95, 200)).await.unwrap();
        let stored = storage.get(Chain::Ethereum, "0xa").await.unwrap().unwrap();
        assert_eq!(stored.block_time.timestamp(), 100);
    }

    #[tokio::test]
    async fn test_recent_for_key_window_and_order() {
        let storage = MemoryStorage::new();
        storage.upsert(record("0xa", 0.9, 100)).await.unwrap();
        storage.upsert(record("0xb", 0.9, 105)).await.unwrap();
        storage.upsert(record("0xc", 0.9, 130)).await.unwrap();

        let rows = storage
            .recent_for_key(
                "0xwhale",
                "USDC",
                Utc.timestamp_opt(103, 0).unwrap(),
                Duration::from_secs(10),
                200,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        // Newest first
        assert_eq!(rows[0].tx_hash, "0xb");
        assert_eq!(rows[1].tx_hash, "0xa");
    }

    #[tokio::test]
    async fn test_replace_swaps_rows() {
        let storage = MemoryStorage::new();
        storage.upsert(record("0xa", 0.7, 100)).await.unwrap();
        storage
            .replace(Chain::Ethereum, "0xa", record("0xb", 0.9, 101))
            .await
            .unwrap();

        assert_eq!(storage.count().await.unwrap(), 1);
        assert!(storage.get(Chain::Ethereum, "0xa").await.unwrap().is_none());
        assert!(storage.get(Chain::Ethereum, "0xb").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failing_flag_surfaces_transient_errors() {
        let storage = MemoryStorage::new();
        storage.set_failing(true);
        assert!(matches!(
            storage.upsert(record("0xa", 0.9, 100)).await,
            Err(StorageError::Transient(_))
        ));
        storage.set_failing(false);
        assert!(storage.upsert(record("0xa", 0.9, 100)).await.is_ok());
    }
}
