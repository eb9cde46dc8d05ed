//! The record sink
//!
//! Idempotent storage writes with bounded retries, a JSONL dead-letter
//! file for permanent failures, per-token sentiment counters and a
//! line-delimited JSON audit stream.

use crate::error::{SinkError, StorageError};
use crate::storage::{Storage, UpsertOutcome};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use types::{Chain, SuppressionEvent, WhaleRecord};

/// Per-token buy/sell/transfer counters feeding the sentiment
/// aggregator.
#[derive(Default)]
pub struct SentimentCounters {
    tokens: DashMap<String, TokenSentiment>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenSentiment {
    pub buys: u64,
    pub sells: u64,
    pub transfers: u64,
    pub other: u64,
}

impl SentimentCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: &WhaleRecord) {
        let mut entry = self
            .tokens
            .entry(record.token_symbol.to_uppercase())
            .or_default();
        let kind = record.classification;
        if kind.is_buy_side() {
            entry.buys += 1;
        } else if kind.is_sell_side() {
            entry.sells += 1;
        } else if kind == types::ClassificationKind::Transfer {
            entry.transfers += 1;
        } else {
            entry.other += 1;
        }
    }

    pub fn get(&self, token: &str) -> Option<TokenSentiment> {
        self.tokens.get(&token.to_uppercase()).map(|entry| *entry)
    }

    pub fn all(&self) -> Vec<(String, TokenSentiment)> {
        let mut rows: Vec<_> = self
            .tokens
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

/// Append-only JSONL writer shared by the audit and dead-letter files.
struct JsonlWriter {
    path: PathBuf,
    file: Mutex<Option<std::fs::File>>,
}

impl JsonlWriter {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    fn append(&self, line: &serde_json::Value) -> std::io::Result<()> {
        let mut guard = self.file.lock();
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            *guard = Some(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?,
            );
        }
        match guard.as_mut() {
            Some(file) => writeln!(file, "{line}"),
            None => Ok(()),
        }
    }
}

/// Retry/backoff tuning for storage writes.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub max_attempts: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        use config::service::pipeline;
        Self {
            backoff_base: Duration::from_millis(pipeline::SINK_BACKOFF_BASE_MS),
            backoff_cap: Duration::from_millis(pipeline::SINK_BACKOFF_CAP_MS),
            max_attempts: pipeline::SINK_MAX_ATTEMPTS,
        }
    }
}

/// Idempotent storage writer with audit and dead-letter side channels.
pub struct RecordSink {
    storage: Arc<dyn Storage>,
    counters: Arc<SentimentCounters>,
    audit: JsonlWriter,
    dead_letter: JsonlWriter,
    config: SinkConfig,
}

impl RecordSink {
    pub fn new(
        storage: Arc<dyn Storage>,
        counters: Arc<SentimentCounters>,
        audit_path: PathBuf,
        dead_letter_path: PathBuf,
        config: SinkConfig,
    ) -> Self {
        Self {
            storage,
            counters,
            audit: JsonlWriter::new(audit_path),
            dead_letter: JsonlWriter::new(dead_letter_path),
            config,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn counters(&self) -> &Arc<SentimentCounters> {
        &self.counters
    }

    /// Store one record with retry; on permanent failure the payload
    /// lands in the dead-letter queue.
    pub async fn store(&self, record: WhaleRecord) -> Result<UpsertOutcome, SinkError> {
        let result = self
            .with_retry(|| {
                let record = record.clone();
                async move { self.storage.upsert(record).await }
            })
            .await;
        match result {
            Ok(outcome) => {
                self.counters.record(&record);
                self.emit_audit("stored", &record, Some(outcome));
                Ok(outcome)
            }
            Err((attempts, last_error)) => self.dead_letter(record, attempts, last_error),
        }
    }

    /// Dedup merge: replace an existing row with the incoming record.
    pub async fn replace(
        &self,
        old_chain: Chain,
        old_tx_hash: String,
        record: WhaleRecord,
    ) -> Result<(), SinkError> {
        let result = self
            .with_retry(|| {
                let record = record.clone();
                let old_tx_hash = old_tx_hash.clone();
                async move {
                    self.storage
                        .replace(old_chain, &old_tx_hash, record)
                        .await
                }
            })
            .await;
        match result {
            Ok(()) => {
                self.counters.record(&record);
                self.emit_audit("merged", &record, None);
                Ok(())
            }
            Err((attempts, last_error)) => {
                self.dead_letter(record, attempts, last_error).map(|_| ())
            }
        }
    }

    /// Emit the structured suppression event to the audit stream.
    pub fn emit_suppression(&self, event: &SuppressionEvent) {
        info!(
            incoming = %event.incoming_hash,
            existing = %event.existing_hash,
            pattern = event.pattern.as_str(),
            time_diff_ms = event.time_diff_ms,
            usd_diff = %event.usd_diff,
            "near-duplicate suppressed"
        );
        let line = json!({
            "type": "suppression",
            "at": Utc::now().to_rfc3339(),
            "event": event,
        });
        if let Err(error) = self.audit.append(&line) {
            warn!(%error, "audit write failed");
        }
    }

    async fn with_retry<F, Fut, T>(&self, operation: F) -> Result<T, (u32, StorageError)>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, StorageError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_recoverable() && attempt < self.config.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(%error, attempt, ?delay, "transient storage failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err((attempt, error)),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .backoff_base
            .saturating_mul(1u32 << (attempt - 1).min(16))
            .min(self.config.backoff_cap);
        let jitter = rand::thread_rng().gen_range(0.875..=1.125);
        exp.mul_f64(jitter)
    }

    fn dead_letter(
        &self,
        record: WhaleRecord,
        attempts: u32,
        last_error: StorageError,
    ) -> Result<UpsertOutcome, SinkError> {
        error!(
            tx_hash = %record.tx_hash,
            attempts,
            %last_error,
            "storage write failed permanently, dead-lettering"
        );
        let line = json!({
            "type": "dead_letter",
            "at": Utc::now().to_rfc3339(),
            "attempts": attempts,
            "last_error": last_error.to_string(),
            "record": record,
        });
        self.dead_letter
            .append(&line)
            .map_err(|e| SinkError::DeadLetterUnavailable(e.to_string()))?;
        Err(SinkError::DeadLettered {
            attempts,
            last_error: last_error.to_string(),
        })
    }

    fn emit_audit(&self, kind: &str, record: &WhaleRecord, outcome: Option<UpsertOutcome>) {
        let line = json!({
            "type": kind,
            "at": Utc::now().to_rfc3339(),
            "chain": record.chain,
            "tx_hash": record.tx_hash,
            "classification": record.classification,
            "confidence": record.confidence,
            "token": record.token_symbol,
            "usd_value": record.usd_value,
            "whale": record.whale_address,
            "outcome": outcome.map(|o| format!("{o:?}")),
        });
        if let Err(error) = self.audit.append(&line) {
            warn!(%error, "audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;
    use types::{ClassificationKind, LabelKind};

    fn record(tx_hash: &str, kind: ClassificationKind) -> WhaleRecord {
        WhaleRecord {
            chain: Chain::Ethereum,
            tx_hash: tx_hash.into(),
            block_time: Utc.timestamp_opt(100, 0).unwrap(),
            whale_address: Some("0xwhale".into()),
            counterparty_address: None,
            counterparty_kind: LabelKind::Cex,
            is_cex_transaction: true,
            classification: kind,
            confidence: 0.9,
            token_symbol: "ETH".into(),
            usd_value: dec!(100_000),
            from_label: None,
            to_label: None,
            evidence: vec![],
            source_id: "test".into(),
            ingested_at: Utc.timestamp_opt(100, 0).unwrap(),
        }
    }

    fn sink(storage: Arc<MemoryStorage>, dir: &std::path::Path) -> RecordSink {
        RecordSink::new(
            storage,
            Arc::new(SentimentCounters::new()),
            dir.join("audit.jsonl"),
            dir.join("dead_letter.jsonl"),
            SinkConfig {
                backoff_base: Duration::from_millis(1),
                backoff_cap: Duration::from_millis(4),
                max_attempts: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_store_updates_counters_and_audit() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let sink = sink(storage.clone(), dir.path());

        sink.store(record("0xa", ClassificationKind::Buy)).await.unwrap();
        sink.store(record("0xb", ClassificationKind::Sell)).await.unwrap();

        let sentiment = sink.counters().get("ETH").unwrap();
        assert_eq!(sentiment.buys, 1);
        assert_eq!(sentiment.sells, 1);

        let audit = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert_eq!(audit.lines().count(), 2);
        assert!(audit.contains("\"type\":\"stored\""));
    }

    #[tokio::test]
    async fn test_permanent_failure_dead_letters() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::new());
        storage.set_failing(true);
        let sink = sink(storage.clone(), dir.path());

        let result = sink.store(record("0xa", ClassificationKind::Buy)).await;
        assert!(matches!(
            result,
            Err(SinkError::DeadLettered { attempts: 3, .. })
        ));

        let dlq = std::fs::read_to_string(dir.path().join("dead_letter.jsonl")).unwrap();
        assert!(dlq.contains("0xa"));
        assert!(dlq.contains("storage unavailable"));
        // Nothing counted for a failed write
        assert!(sink.counters().get("ETH").is_none());
    }

    #[tokio::test]
    async fn test_suppression_event_hits_audit() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let sink = sink(storage, dir.path());

        sink.emit_suppression(&SuppressionEvent {
            incoming_hash: "0xb".into(),
            existing_hash: "0xa".into(),
            reason: "mirror".into(),
            pattern: types::DuplicatePattern::Mirror,
            time_diff_ms: 3000,
            usd_diff: dec!(0),
        });

        let audit = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert!(audit.contains("\"type\":\"suppression\""));
    }
}
