//! Universally quantified properties checked with proptest

use chrono::{TimeZone, Utc};
use classifier_service::aggregate::{Aggregator, DirectionStack};
use config::{ClassifierConfig, DedupConfig};
use proptest::prelude::*;
use rust_decimal::Decimal;
use types::{Chain, ClassificationKind, LabelKind, WhaleRecord};
use whale_pipeline::{MemoryStorage, NearDupeDetector, Storage};

fn record(tx_hash: &str, kind: ClassificationKind, usd: u64, confidence: f64) -> WhaleRecord {
    WhaleRecord {
        chain: Chain::Ethereum,
        tx_hash: tx_hash.into(),
        block_time: Utc.timestamp_opt(100, 0).unwrap(),
        whale_address: Some("0xwhale".into()),
        counterparty_address: None,
        counterparty_kind: LabelKind::Cex,
        is_cex_transaction: true,
        classification: kind,
        confidence,
        token_symbol: "USDC".into(),
        usd_value: Decimal::from(usd),
        from_label: None,
        to_label: None,
        evidence: vec![],
        source_id: "prop".into(),
        ingested_at: Utc.timestamp_opt(100, 0).unwrap(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Storing the same key twice always leaves one record carrying
    /// the higher confidence.
    #[test]
    fn prop_upsert_idempotent(c1 in 0.0f64..=1.0, c2 in 0.0f64..=1.0) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let storage = MemoryStorage::new();
            storage.upsert(record("0xa", ClassificationKind::Buy, 1000, c1)).await.unwrap();
            storage.upsert(record("0xa", ClassificationKind::Buy, 1000, c2)).await.unwrap();

            prop_assert_eq!(storage.count().await.unwrap(), 1);
            let stored = storage.get(Chain::Ethereum, "0xa").await.unwrap().unwrap();
            prop_assert!((stored.confidence - c1.max(c2)).abs() < 1e-12);
            Ok(())
        })?;
    }

    /// Above the safeguard threshold nothing ever matches as a
    /// duplicate, whatever the pattern would have been.
    #[test]
    fn prop_safeguard_never_suppresses(
        usd in 5_000_001u64..50_000_000,
        c1 in 0.0f64..=1.0,
        c2 in 0.0f64..=1.0,
    ) {
        let detector = NearDupeDetector::new(DedupConfig::default());
        let a = record("0xa", ClassificationKind::Buy, usd, c1);
        let b = record("0xb", ClassificationKind::Sell, usd, c2);
        prop_assert!(detector.matches_records(&b, &a).is_none());
    }

    /// Below the safeguard, a mirror pair with equal USD always
    /// matches; the predicate is symmetric in the pattern.
    #[test]
    fn prop_mirror_detected_below_safeguard(usd in 1u64..5_000_000, c in 0.0f64..=1.0) {
        let detector = NearDupeDetector::new(DedupConfig::default());
        let a = record("0xa", ClassificationKind::Buy, usd, 0.9);
        let b = record("0xb", ClassificationKind::Sell, usd, c);
        prop_assert!(detector.matches_records(&b, &a).is_some());
    }

    /// Adding a concordant vote never lowers a direction's stacked
    /// confidence, and the stack stays within [0, 1].
    #[test]
    fn prop_stacking_monotone_and_bounded(
        votes in prop::collection::vec((0.3f64..=0.7, 0.0f64..=1.0), 1..8),
        extra_weight in 0.3f64..=0.7,
        extra_confidence in 0.001f64..=1.0,
    ) {
        let mut stack = DirectionStack::new();
        for (weight, confidence) in &votes {
            stack.push(*weight, *confidence);
            prop_assert!(stack.confidence() >= 0.0);
            prop_assert!(stack.confidence() <= 1.0);
        }
        let before = stack.confidence();
        stack.push(extra_weight, extra_confidence);
        prop_assert!(stack.confidence() >= before);
        prop_assert!(stack.confidence() <= 1.0);
    }

    /// Directional kinds bucket exactly by the configured thresholds:
    /// moderate iff confidence in [medium, high).
    #[test]
    fn prop_bucket_thresholds(confidence in 0.0f64..=1.0) {
        let config = ClassifierConfig::default();
        let aggregator = Aggregator::new(config.clone());
        let kind = aggregator.bucket(ClassificationKind::Sell, confidence);
        if confidence >= config.high {
            prop_assert_eq!(kind, ClassificationKind::Sell);
        } else if confidence >= config.medium {
            prop_assert_eq!(kind, ClassificationKind::ModerateSell);
        } else {
            prop_assert_eq!(kind, ClassificationKind::Transfer);
        }
    }

    /// Non-directional kinds never bucket into trades.
    #[test]
    fn prop_protocol_kinds_keep_identity(confidence in 0.0f64..=1.0) {
        let aggregator = Aggregator::new(ClassifierConfig::default());
        for kind in [
            ClassificationKind::Staking,
            ClassificationKind::Defi,
            ClassificationKind::Bridge,
            ClassificationKind::Liquidity,
        ] {
            prop_assert_eq!(aggregator.bucket(kind, confidence), kind);
        }
    }
}
