//! Offline duplicate cleanup
//!
//! Batch maintenance over stored records using the same match predicate
//! and safeguards as the online suppressor. Dry-run by default: nothing
//! is deleted unless the operator asked for `--live`.

use crate::dedup::NearDupeDetector;
use crate::error::StorageError;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::info;
use types::{Chain, WhaleRecord};

/// One detected duplicate pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateFinding {
    pub keep_chain: Chain,
    pub keep_hash: String,
    pub remove_chain: Chain,
    pub remove_hash: String,
    pub pattern: String,
    pub time_diff_ms: i64,
}

/// What the cleanup pass found and did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub scanned: usize,
    pub keys: usize,
    pub findings: Vec<DuplicateFinding>,
    pub pattern_counts: BTreeMap<String, usize>,
    pub removed: usize,
    pub live: bool,
}

/// Scan storage for near-duplicates; delete the losing record of each
/// pair when `live` is set.
pub async fn cleanup_duplicates(
    storage: &dyn Storage,
    detector: &NearDupeDetector,
    live: bool,
) -> Result<CleanupReport, StorageError> {
    let rows = storage.scan().await?;
    let mut report = CleanupReport {
        scanned: rows.len(),
        live,
        ..Default::default()
    };

    // Group by dedup key; scan() returns rows in block-time order
    let mut groups: BTreeMap<(String, String), Vec<&WhaleRecord>> = BTreeMap::new();
    for row in &rows {
        if let Some(key) = row.dedup_key() {
            groups.entry(key).or_default().push(row);
        }
    }
    report.keys = groups.len();

    let mut removed: HashSet<(Chain, String)> = HashSet::new();
    for group in groups.values() {
        for (i, a) in group.iter().enumerate() {
            if removed.contains(&a.key()) {
                continue;
            }
            for b in group.iter().skip(i + 1) {
                if removed.contains(&b.key()) {
                    continue;
                }
                let Some(pattern) = detector.matches_records(b, a) else {
                    continue;
                };
                // Merge policy: the higher-confidence record survives
                let (keep, remove) = if b.confidence > a.confidence {
                    (*b, *a)
                } else {
                    (*a, *b)
                };
                removed.insert(remove.key());
                *report
                    .pattern_counts
                    .entry(pattern.as_str().to_string())
                    .or_default() += 1;
                report.findings.push(DuplicateFinding {
                    keep_chain: keep.chain,
                    keep_hash: keep.tx_hash.clone(),
                    remove_chain: remove.chain,
                    remove_hash: remove.tx_hash.clone(),
                    pattern: pattern.as_str().to_string(),
                    time_diff_ms: (b.block_time - a.block_time).num_milliseconds(),
                });
            }
        }
    }

    if live {
        for finding in &report.findings {
            if storage
                .delete(finding.remove_chain, &finding.remove_hash)
                .await?
            {
                report.removed += 1;
            }
        }
    }

    info!(
        scanned = report.scanned,
        findings = report.findings.len(),
        removed = report.removed,
        live,
        "duplicate cleanup complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::{TimeZone, Utc};
    use config::DedupConfig;
    use rust_decimal_macros::dec;
    use types::{ClassificationKind, LabelKind};

    fn record(tx_hash: &str, kind: ClassificationKind, confidence: f64, secs: i64) -> WhaleRecord {
        WhaleRecord {
            chain: Chain::Ethereum,
            tx_hash: tx_hash.into(),
            block_time: Utc.timestamp_opt(secs, 0).unwrap(),
            whale_address: Some("0xwhale".into()),
            counterparty_address: None,
            counterparty_kind: LabelKind::Cex,
            is_cex_transaction: true,
            classification: kind,
            confidence,
            token_symbol: "USDC".into(),
            usd_value: dec!(100_000),
            from_label: None,
            to_label: None,
            evidence: vec![],
            source_id: "test".into(),
            ingested_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    async fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        // Mirror pair within the window
        storage
            .upsert(record("0xa", ClassificationKind::Buy, 0.9, 100))
            .await
            .unwrap();
        storage
            .upsert(record("0xb", ClassificationKind::Sell, 0.6, 103))
            .await
            .unwrap();
        // Unrelated record outside the window
        storage
            .upsert(record("0xc", ClassificationKind::Buy, 0.9, 500))
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_deleting() {
        let storage = seeded().await;
        let detector = NearDupeDetector::new(DedupConfig::default());

        let report = cleanup_duplicates(&storage, &detector, false).await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].remove_hash, "0xb");
        assert_eq!(report.removed, 0);
        assert_eq!(storage.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_live_removes_lower_confidence() {
        let storage = seeded().await;
        let detector = NearDupeDetector::new(DedupConfig::default());

        let report = cleanup_duplicates(&storage, &detector, true).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(storage.count().await.unwrap(), 2);
        assert!(storage.get(Chain::Ethereum, "0xb").await.unwrap().is_none());
        assert!(storage.get(Chain::Ethereum, "0xa").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_safeguarded_values_not_cleaned() {
        let storage = MemoryStorage::new();
        let mut a = record("0xa", ClassificationKind::Buy, 0.9, 100);
        a.usd_value = dec!(6_000_000);
        let mut b = record("0xb", ClassificationKind::Sell, 0.6, 103);
        b.usd_value = dec!(6_000_000);
        storage.upsert(a).await.unwrap();
        storage.upsert(b).await.unwrap();

        let detector = NearDupeDetector::new(DedupConfig::default());
        let report = cleanup_duplicates(&storage, &detector, true).await.unwrap();
        assert!(report.findings.is_empty());
        assert_eq!(storage.count().await.unwrap(), 2);
    }
}
