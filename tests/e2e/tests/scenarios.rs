//! End-to-end scenarios through the fully wired pipeline

use e2e_harness::{
    quiet_hour, transfer, TestPipeline, BINANCE_HOT, BINANCE_HOT_2, COINBASE_HOT,
};
use rust_decimal_macros::dec;
use types::{Chain, ClassificationKind, LabelKind};
use whale_pipeline::storage::Storage;

const WHALE: &str = "0xabc0000000000000000000000000000000000123";
const OTHER_WALLET: &str = "0xdef0000000000000000000000000000000000456";

#[tokio::test]
async fn test_cex_withdrawal_stores_buy() {
    let mut pipeline = TestPipeline::spawn();

    pipeline
        .send(transfer(
            "0xS1",
            BINANCE_HOT,
            WHALE,
            "USDC",
            dec!(50_000),
            quiet_hour(0),
        ))
        .await;
    let drained = pipeline.drain().await;

    let record = drained
        .storage
        .get(Chain::Ethereum, "0xs1")
        .await
        .unwrap()
        .expect("record stored");
    assert_eq!(record.classification, ClassificationKind::Buy);
    assert_eq!(record.whale_address.as_deref(), Some(WHALE));
    assert_eq!(record.counterparty_address.as_deref(), Some(BINANCE_HOT));
    assert_eq!(record.counterparty_kind, LabelKind::Cex);
    assert!(record.is_cex_transaction);
    assert!(record.confidence >= 0.90);
    assert!(record
        .evidence
        .iter()
        .any(|line| line.contains("CEX withdrawal from Binance")));
    assert_eq!(record.usd_value, dec!(50_000));
}

#[tokio::test]
async fn test_cex_deposit_with_gas_urgency_stores_sell() {
    let mut pipeline = TestPipeline::spawn();
    pipeline
        .prices
        .observe("ETH", dec!(3000), quiet_hour(0));

    let mut raw = transfer(
        "0xS2",
        OTHER_WALLET,
        COINBASE_HOT,
        "ETH",
        dec!(10),
        quiet_hour(0),
    );
    raw.gas_price_gwei = Some(dec!(120));
    pipeline.send(raw).await;
    let drained = pipeline.drain().await;

    let record = drained
        .storage
        .get(Chain::Ethereum, "0xs2")
        .await
        .unwrap()
        .expect("record stored");
    assert_eq!(record.classification, ClassificationKind::Sell);
    assert_eq!(record.whale_address.as_deref(), Some(OTHER_WALLET));
    assert_eq!(record.counterparty_kind, LabelKind::Cex);
    assert_eq!(record.usd_value, dec!(30_000));
    assert!(record.confidence >= 0.95);
}

#[tokio::test]
async fn test_internal_cex_move_dropped() {
    let mut pipeline = TestPipeline::spawn();

    pipeline
        .send(transfer(
            "0xS3",
            BINANCE_HOT,
            BINANCE_HOT_2,
            "USDT",
            dec!(2_000_000),
            quiet_hour(0),
        ))
        .await;
    let drained = pipeline.drain().await;

    assert_eq!(drained.storage.count().await.unwrap(), 0);
    assert_eq!(
        drained
            .stats
            .dropped
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_mirror_duplicate_suppressed() {
    let mut pipeline = TestPipeline::spawn();

    // Same economic event seen twice: withdrawal to the whale, then a
    // "deposit" report of the same funds three seconds later
    pipeline
        .send(transfer(
            "0xS4a",
            BINANCE_HOT,
            WHALE,
            "USDC",
            dec!(100_000),
            quiet_hour(0),
        ))
        .await;
    pipeline
        .send(transfer(
            "0xS4b",
            WHALE,
            COINBASE_HOT,
            "USDC",
            dec!(100_000),
            quiet_hour(3),
        ))
        .await;
    let drained = pipeline.drain().await;

    assert_eq!(drained.storage.count().await.unwrap(), 1);
    assert_eq!(
        drained
            .stats
            .suppressed
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
    let suppressions = drained.audit_lines("suppression");
    assert_eq!(suppressions.len(), 1);
    assert_eq!(
        suppressions[0]["event"]["pattern"].as_str(),
        Some("mirror")
    );
}

#[tokio::test]
async fn test_safeguard_keeps_both_large_records() {
    let mut pipeline = TestPipeline::spawn();

    pipeline
        .send(transfer(
            "0xS5a",
            BINANCE_HOT,
            WHALE,
            "USDC",
            dec!(6_000_000),
            quiet_hour(0),
        ))
        .await;
    pipeline
        .send(transfer(
            "0xS5b",
            WHALE,
            COINBASE_HOT,
            "USDC",
            dec!(6_000_000),
            quiet_hour(3),
        ))
        .await;
    let drained = pipeline.drain().await;

    assert_eq!(drained.storage.count().await.unwrap(), 2);
    assert_eq!(
        drained
            .stats
            .suppressed
            .load(std::sync::atomic::Ordering::Relaxed),
        0
    );
}

#[tokio::test]
async fn test_network_failure_still_produces_records() {
    let mut pipeline = TestPipeline::spawn_with_dead_network();

    pipeline
        .send(transfer(
            "0xS8",
            "0xunknown00000000000000000000000000000001",
            "0xunknown00000000000000000000000000000002",
            "PEPE",
            dec!(1_000_000),
            quiet_hour(0),
        ))
        .await;
    let drained = pipeline.drain().await;

    let record = drained
        .storage
        .get(Chain::Ethereum, "0xs8")
        .await
        .unwrap()
        .expect("record stored despite dead network");
    assert_eq!(record.classification, ClassificationKind::Transfer);
    assert_eq!(record.usd_value, dec!(0));
    assert_eq!(record.from_label.as_deref(), Some("UNKNOWN"));
    assert_eq!(record.counterparty_kind, LabelKind::Unknown);
}

#[tokio::test]
async fn test_whale_perspective_never_names_a_cex() {
    let mut pipeline = TestPipeline::spawn();

    for (i, (from, to)) in [
        (BINANCE_HOT, WHALE),
        (WHALE, COINBASE_HOT),
        (OTHER_WALLET, WHALE),
    ]
    .iter()
    .enumerate()
    {
        pipeline
            .send(transfer(
                &format!("0xP4{i}"),
                from,
                to,
                "USDC",
                dec!(10_000) * rust_decimal::Decimal::from(i as u64 + 1),
                quiet_hour(i as i64 * 60),
            ))
            .await;
    }
    let drained = pipeline.drain().await;

    for record in drained.storage.scan().await.unwrap() {
        if let Some(whale) = &record.whale_address {
            assert_ne!(whale, BINANCE_HOT);
            assert_ne!(whale, COINBASE_HOT);
        }
    }
}

#[tokio::test]
async fn test_ordering_per_whale_follows_emission() {
    let mut pipeline = TestPipeline::spawn();

    // Distinct USD sizes keep these out of the duplicate tolerances
    for i in 0..10i64 {
        pipeline
            .send(transfer(
                &format!("0xORD{i}"),
                BINANCE_HOT,
                WHALE,
                "USDC",
                dec!(10_000) + rust_decimal::Decimal::from(i as u64 * 1000),
                quiet_hour(i),
            ))
            .await;
    }
    let drained = pipeline.drain().await;

    assert_eq!(drained.storage.count().await.unwrap(), 10);

    // The audit log preserves store order; block times must be
    // non-decreasing for the whale's shard
    let stored = drained.audit_lines("stored");
    assert_eq!(stored.len(), 10);
    let mut last = None;
    for line in &stored {
        let hash = line["tx_hash"].as_str().unwrap().to_string();
        let index: i64 = hash.trim_start_matches("0xord").parse().unwrap();
        if let Some(previous) = last {
            assert!(index > previous, "store order regressed: {hash}");
        }
        last = Some(index);
    }
}

#[tokio::test]
async fn test_registry_accumulates_and_sentiment_counts() {
    let mut pipeline = TestPipeline::spawn();

    for i in 0..5i64 {
        pipeline
            .send(transfer(
                &format!("0xREG{i}"),
                BINANCE_HOT,
                WHALE,
                "USDC",
                dec!(60_000) + rust_decimal::Decimal::from(i as u64 * 1000),
                quiet_hour(i * 120),
            ))
            .await;
    }
    let drained = pipeline.drain().await;

    let stats = drained.registry.lookup(WHALE).expect("whale tracked");
    assert_eq!(stats.trade_count, 5);
    assert!(stats.is_proven);

    let sentiment = drained.counters.get("USDC").expect("sentiment counted");
    assert_eq!(sentiment.buys, 5);
    assert_eq!(sentiment.sells, 0);
}
