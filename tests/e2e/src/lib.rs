//! End-to-end test harness
//!
//! Wires a complete in-process pipeline: the embedded label registry,
//! an optionally failing explorer, a controllable price feed, the full
//! classification engine, the two-layer suppressor and the in-memory
//! storage backend. Tests push raw transfers through a registered
//! source output and assert on storage, counters and the audit log.

use chrono::{DateTime, TimeZone, Utc};
use classifier_service::ClassificationEngine;
use config::{EnrichmentConfig, QueueConfig, RuntimeConfig};
use enrichment_service::{
    Enricher, EnrichError, ExplorerClient, LabelProvider, PriceResolver, StaticRegistry,
};
use ingest_service::{FanIn, ShutdownSignal, SourceMetrics, SourceOutput};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use types::{Chain, RawTransfer};
use whale_pipeline::{
    MemoryStorage, NearDupeDetector, Pipeline, PipelineDeps, PipelineStats, RecordSink,
    SentimentCounters, Storage, WhaleRegistry,
};

/// Well-known registry addresses used across scenarios.
pub const BINANCE_HOT: &str = "0x28c6c06298d514db089934071355e5743bf21d60";
pub const BINANCE_HOT_2: &str = "0x21a31ee1afc51d94c2efccaa2092ad1028285549";
pub const COINBASE_HOT: &str = "0x71660c4005ba85c37ccec55d0c4493e66fe775d3";

/// Explorer stub that always fails, for network-failure scenarios.
struct DeadExplorer;

#[async_trait::async_trait]
impl ExplorerClient for DeadExplorer {
    async fn fetch_label(
        &self,
        _address: &str,
        _chain: Chain,
    ) -> enrichment_service::Result<Option<String>> {
        Err(EnrichError::Store("explorer unreachable".into()))
    }
}

/// A fully wired in-process pipeline plus handles for assertions.
pub struct TestPipeline {
    pub storage: Arc<MemoryStorage>,
    pub stats: Arc<PipelineStats>,
    pub registry: Arc<WhaleRegistry>,
    pub counters: Arc<SentimentCounters>,
    pub prices: Arc<PriceResolver>,
    pub dir: TempDir,
    pipeline: Pipeline,
    output: Option<SourceOutput>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl TestPipeline {
    /// Spawn with default config and a healthy (but empty) label store.
    pub fn spawn() -> Self {
        Self::spawn_with(RuntimeConfig::default(), false)
    }

    /// Spawn with every remote lookup failing.
    pub fn spawn_with_dead_network() -> Self {
        Self::spawn_with(RuntimeConfig::default(), true)
    }

    pub fn spawn_with(config: RuntimeConfig, dead_network: bool) -> Self {
        let dir = TempDir::new().expect("tempdir");

        let explorer: Option<Arc<dyn ExplorerClient>> = if dead_network {
            Some(Arc::new(DeadExplorer))
        } else {
            None
        };
        let labels = Arc::new(LabelProvider::new(
            StaticRegistry::builtin(),
            None,
            explorer,
            EnrichmentConfig {
                label_deadline: Duration::from_millis(100),
                ..config.enrichment.clone()
            },
        ));
        let prices = Arc::new(PriceResolver::new(config.enrichment.price_staleness));
        let enricher = Arc::new(Enricher::new(labels, prices.clone()));

        let registry = Arc::new(WhaleRegistry::new(Some(dir.path().join("registry.json"))));
        let engine = Arc::new(
            ClassificationEngine::new(config.classifier.clone())
                .with_stats_lookup(registry.clone()),
        );

        let storage = Arc::new(MemoryStorage::new());
        let counters = Arc::new(SentimentCounters::new());
        let sink = Arc::new(RecordSink::new(
            storage.clone() as Arc<dyn Storage>,
            counters.clone(),
            dir.path().join("audit.jsonl"),
            dir.path().join("dead_letter.jsonl"),
            Default::default(),
        ));
        let dedup = Arc::new(NearDupeDetector::new(config.dedup.clone()));
        let stats = Arc::new(PipelineStats::new());

        let (fanin, fanin_rx) = FanIn::bounded(config.queues.fanin_capacity);
        let output = fanin.register("e2e", None, Arc::new(SourceMetrics::default()));

        // The sender side stays alive until after the drain: tests end
        // by closing the channel, never by triggering shutdown, so the
        // router consumes every queued event
        let (shutdown_tx, shutdown) = ShutdownSignal::new();

        let pipeline = Pipeline::spawn(
            PipelineDeps {
                enricher,
                engine,
                dedup,
                sink,
                registry: registry.clone(),
                stats: stats.clone(),
            },
            QueueConfig {
                enrich_workers: 2,
                classify_workers: 4,
                ..config.queues
            },
            fanin_rx,
            shutdown,
        );

        Self {
            storage,
            stats,
            registry,
            counters,
            prices,
            dir,
            pipeline,
            output: Some(output),
            shutdown_tx,
        }
    }

    /// Push one raw transfer into the fan-in.
    pub async fn send(&mut self, raw: RawTransfer) {
        self.output
            .as_mut()
            .expect("pipeline already drained")
            .send(raw)
            .await
            .expect("fan-in closed");
    }

    /// Close the intake and wait for every stage to drain.
    pub async fn drain(mut self) -> DrainedPipeline {
        drop(self.output.take());
        self.pipeline.drain(Duration::from_secs(10)).await;
        drop(self.shutdown_tx);
        DrainedPipeline {
            storage: self.storage,
            stats: self.stats,
            registry: self.registry,
            counters: self.counters,
            dir: self.dir,
        }
    }
}

/// What remains after a drain: everything needed for assertions.
pub struct DrainedPipeline {
    pub storage: Arc<MemoryStorage>,
    pub stats: Arc<PipelineStats>,
    pub registry: Arc<WhaleRegistry>,
    pub counters: Arc<SentimentCounters>,
    pub dir: TempDir,
}

impl DrainedPipeline {
    /// Audit lines of a given `type`, in append order.
    pub fn audit_lines(&self, kind: &str) -> Vec<serde_json::Value> {
        let path = self.dir.path().join("audit.jsonl");
        let Ok(text) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        text.lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter(|value| value.get("type").and_then(|t| t.as_str()) == Some(kind))
            .collect()
    }
}

/// A raw transfer builder with scenario-friendly defaults.
pub fn transfer(
    tx_hash: &str,
    from: &str,
    to: &str,
    symbol: &str,
    amount: Decimal,
    block_time: DateTime<Utc>,
) -> RawTransfer {
    RawTransfer {
        source_id: "e2e".into(),
        chain: Chain::Ethereum,
        tx_hash: tx_hash.into(),
        log_index: None,
        block_time,
        from_addr: from.into(),
        to_addr: to.into(),
        token_addr: None,
        symbol: Some(symbol.into()),
        amount,
        decimals: None,
        native_value: None,
        gas_price_gwei: None,
    }
}

/// A block time at 02:00 UTC (outside peak hours), offset by `secs`.
pub fn quiet_hour(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 2, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}
