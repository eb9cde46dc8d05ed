//! Two-layer near-duplicate suppression
//!
//! Hash uniqueness cannot catch the same economic event reported twice
//! with different hashes or metadata: a mirror pair from opposite
//! perspectives, a raw TRANSFER shadowing a classified trade, or two
//! reports disagreeing on the counterparty. Layer 1 is a bounded
//! in-memory ring per `(whale, token)` key; layer 2 is a storage
//! lookback over the same key. A storage failure degrades to layer 1
//! only and never blocks ingestion.

use crate::error::StorageError;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use config::DedupConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::{debug, warn};
use types::{Chain, ClassificationKind, DuplicatePattern, LabelKind, SuppressionEvent, WhaleRecord};

/// Compact ring entry; enough of a record to run the match predicate
/// and the merge policy.
#[derive(Debug, Clone)]
struct RingEntry {
    chain: Chain,
    tx_hash: String,
    block_time: DateTime<Utc>,
    usd_value: Decimal,
    kind: ClassificationKind,
    counterparty_kind: LabelKind,
    is_cex_transaction: bool,
    confidence: f64,
}

impl RingEntry {
    fn of(record: &WhaleRecord) -> Self {
        Self {
            chain: record.chain,
            tx_hash: record.tx_hash.clone(),
            block_time: record.block_time,
            usd_value: record.usd_value,
            kind: record.classification,
            counterparty_kind: record.counterparty_kind,
            is_cex_transaction: record.is_cex_transaction,
            confidence: record.confidence,
        }
    }
}

/// What the suppressor decided for an incoming record.
#[derive(Debug, Clone)]
pub enum DedupDecision {
    /// No duplicate found; store normally.
    Store,
    /// The incoming record wins; replace the matched one in place.
    Replace {
        existing_chain: Chain,
        existing_tx_hash: String,
        /// Earliest block time between the two reports.
        merged_block_time: DateTime<Utc>,
        event: SuppressionEvent,
    },
    /// The existing record wins; drop the incoming one.
    Suppress { event: SuppressionEvent },
}

/// Two-layer near-duplicate detector.
pub struct NearDupeDetector {
    config: DedupConfig,
    rings: DashMap<(String, String), Mutex<VecDeque<RingEntry>>>,
}

impl NearDupeDetector {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            rings: DashMap::new(),
        }
    }

    /// Check an incoming record against both layers.
    pub async fn check(&self, record: &WhaleRecord, storage: &dyn Storage) -> DedupDecision {
        let Some(key) = record.dedup_key() else {
            return DedupDecision::Store;
        };

        // Safeguards: above the audit threshold and protocol
        // interactions are never suppressed
        if record.usd_value > self.config.safeguard_usd {
            debug!(tx_hash = %record.tx_hash, usd = %record.usd_value, "above safeguard, keeping for audit trail");
            return DedupDecision::Store;
        }
        if record.classification.is_protocol() {
            return DedupDecision::Store;
        }

        // Layer 1: memory ring
        if let Some(matched) = self.check_ring(&key, record) {
            return self.resolve(record, matched);
        }

        // Layer 2: storage lookback; degrade to L1-only on failure
        match self.lookback(&key, record, storage).await {
            Ok(Some(matched)) => self.resolve(record, matched),
            Ok(None) => DedupDecision::Store,
            Err(error) => {
                warn!(%error, tx_hash = %record.tx_hash, "dedup lookback failed, memory layer only");
                DedupDecision::Store
            }
        }
    }

    /// Note a record that made it into storage so layer 1 can see it.
    pub fn record_stored(&self, record: &WhaleRecord) {
        let Some(key) = record.dedup_key() else {
            return;
        };
        let ring = self.rings.entry(key).or_insert_with(|| {
            Mutex::new(VecDeque::with_capacity(self.config.ring_capacity))
        });
        let mut ring = ring.lock();
        // Drop the replaced entry when a merge rewrote a hash
        ring.retain(|entry| entry.tx_hash != record.tx_hash || entry.chain != record.chain);
        if ring.len() >= self.config.ring_capacity {
            ring.pop_front();
        }
        ring.push_back(RingEntry::of(record));
    }

    /// Forget a record the merge policy removed.
    pub fn record_removed(&self, chain: Chain, tx_hash: &str, key: &(String, String)) {
        if let Some(ring) = self.rings.get(key) {
            ring.lock()
                .retain(|entry| entry.tx_hash != tx_hash || entry.chain != chain);
        }
    }

    fn check_ring(&self, key: &(String, String), record: &WhaleRecord) -> Option<RingEntry> {
        let ring = self.rings.get(key)?;
        let ring = ring.lock();
        ring.iter()
            .rev()
            .find(|entry| self.matches(record, entry).is_some())
            .cloned()
    }

    async fn lookback(
        &self,
        key: &(String, String),
        record: &WhaleRecord,
        storage: &dyn Storage,
    ) -> Result<Option<RingEntry>, StorageError> {
        let rows = storage
            .recent_for_key(
                &key.0,
                &key.1,
                record.block_time,
                self.config.time_window,
                self.config.lookback_limit,
            )
            .await?;
        Ok(rows
            .iter()
            .map(RingEntry::of)
            .find(|entry| self.matches(record, entry).is_some()))
    }

    /// Offline variant of the match predicate over two stored records,
    /// safeguards included. Used by the duplicate-cleanup command.
    pub fn matches_records(
        &self,
        incoming: &WhaleRecord,
        existing: &WhaleRecord,
    ) -> Option<DuplicatePattern> {
        if incoming.usd_value > self.config.safeguard_usd
            || existing.usd_value > self.config.safeguard_usd
        {
            return None;
        }
        if incoming.classification.is_protocol() || existing.classification.is_protocol() {
            return None;
        }
        self.matches(incoming, &RingEntry::of(existing))
    }

    /// The match predicate: window, USD tolerance, then pattern.
    fn matches(&self, incoming: &WhaleRecord, existing: &RingEntry) -> Option<DuplicatePattern> {
        // A record never duplicates itself; same-hash collisions are
        // the upsert's business
        if incoming.tx_hash == existing.tx_hash && incoming.chain == existing.chain {
            return None;
        }

        let window = chrono::Duration::from_std(self.config.time_window).ok()?;
        let time_diff = incoming.block_time - existing.block_time;
        if time_diff > window || time_diff < -window {
            return None;
        }

        if !self.usd_close(incoming.usd_value, existing.usd_value) {
            return None;
        }

        self.pattern(incoming, existing)
    }

    fn usd_close(&self, a: Decimal, b: Decimal) -> bool {
        let diff = (a - b).abs();
        if diff <= self.config.usd_threshold {
            return true;
        }
        let max = a.max(b);
        if max <= Decimal::ZERO {
            return false;
        }
        use rust_decimal::prelude::ToPrimitive;
        (diff / max)
            .to_f64()
            .map(|ratio| ratio <= self.config.percentage_threshold)
            .unwrap_or(false)
    }

    fn pattern(&self, incoming: &WhaleRecord, existing: &RingEntry) -> Option<DuplicatePattern> {
        let a = incoming.classification;
        let b = existing.kind;

        let mirror = (a.is_buy_side() && b.is_sell_side()) || (a.is_sell_side() && b.is_buy_side());
        if mirror {
            return Some(DuplicatePattern::Mirror);
        }

        let shadow = (a == ClassificationKind::Transfer && b.is_directional())
            || (b == ClassificationKind::Transfer && a.is_directional());
        if shadow {
            return Some(DuplicatePattern::Shadow);
        }

        if a == b {
            if incoming.counterparty_kind != existing.counterparty_kind {
                return Some(DuplicatePattern::CounterpartyMismatch);
            }
            if incoming.is_cex_transaction != existing.is_cex_transaction {
                return Some(DuplicatePattern::CexFlagMismatch);
            }
        }
        None
    }

    /// Merge policy: higher confidence wins.
    fn resolve(&self, incoming: &WhaleRecord, existing: RingEntry) -> DedupDecision {
        // matches() returned Some for this pair already
        let pattern = self
            .pattern(incoming, &existing)
            .unwrap_or(DuplicatePattern::Shadow);
        let time_diff_ms = (incoming.block_time - existing.block_time).num_milliseconds();
        let usd_diff = (incoming.usd_value - existing.usd_value).abs();

        if incoming.confidence > existing.confidence {
            let event = SuppressionEvent {
                incoming_hash: incoming.tx_hash.clone(),
                existing_hash: existing.tx_hash.clone(),
                reason: "incoming report carries higher confidence, merging in place".into(),
                pattern,
                time_diff_ms,
                usd_diff,
            };
            DedupDecision::Replace {
                existing_chain: existing.chain,
                existing_tx_hash: existing.tx_hash,
                merged_block_time: incoming.block_time.min(existing.block_time),
                event,
            }
        } else {
            let event = SuppressionEvent {
                incoming_hash: incoming.tx_hash.clone(),
                existing_hash: existing.tx_hash.clone(),
                reason: "existing report carries equal or higher confidence".into(),
                pattern,
                time_diff_ms,
                usd_diff,
            };
            DedupDecision::Suppress { event }
        }
    }
}
