//! Stage wiring
//!
//! Bounded queues between worker pools:
//!
//! ```text
//! fan-in ─▶ router ─▶ [enrich pool] ─▶ [classify pool] ─▶ resequencer ─▶ shards ─▶ sink
//!           seq++                                          restore order   32 workers
//! ```
//!
//! The router stamps a sequence number on every event; the resequencer
//! releases events back in stamped order after the parallel pools, so
//! each shard processes its `(chain, whale)` keys in emission order.
//! Storage writes happen inside the shard worker, keeping writes within
//! a shard serialized and the dedup lookback read-after-write.

use crate::dedup::{DedupDecision, NearDupeDetector};
use crate::registry::WhaleRegistry;
use crate::sink::RecordSink;
use crate::stats::PipelineStats;
use chrono::Utc;
use classifier_service::{perspectivize, ClassificationEngine, Decision, PerspectiveOutcome};
use config::QueueConfig;
use enrichment_service::Enricher;
use ingest_service::ShutdownSignal;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{Classification, EnrichedTransfer, RawTransfer, WhaleRecord};

/// Everything the stages need, injected at construction so tests can
/// swap any piece for a fake.
pub struct PipelineDeps {
    pub enricher: Arc<Enricher>,
    pub engine: Arc<ClassificationEngine>,
    pub dedup: Arc<NearDupeDetector>,
    pub sink: Arc<RecordSink>,
    pub registry: Arc<WhaleRegistry>,
    pub stats: Arc<PipelineStats>,
}

#[derive(Debug)]
struct Envelope<T> {
    seq: u64,
    payload: T,
}

/// A running pipeline's task handles.
pub struct Pipeline {
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Wire and spawn every stage. The pipeline drains and exits when
    /// the fan-in channel closes or shutdown triggers.
    pub fn spawn(
        deps: PipelineDeps,
        queues: QueueConfig,
        fanin_rx: mpsc::Receiver<RawTransfer>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let mut handles = Vec::new();

        let (enrich_tx, enrich_rx) = mpsc::channel::<Envelope<RawTransfer>>(queues.stage_capacity);
        let (classify_tx, classify_rx) =
            mpsc::channel::<Envelope<EnrichedTransfer>>(queues.stage_capacity);
        let (reseq_tx, reseq_rx) =
            mpsc::channel::<Envelope<Option<WhaleRecord>>>(queues.stage_capacity);

        // Router: single sequencing point
        handles.push(tokio::spawn(router(
            fanin_rx,
            enrich_tx,
            deps.stats.clone(),
            shutdown.clone(),
        )));

        // Enrichment pool
        let enrich_rx = Arc::new(Mutex::new(enrich_rx));
        for _ in 0..queues.enrich_workers {
            handles.push(tokio::spawn(enrich_worker(
                enrich_rx.clone(),
                classify_tx.clone(),
                deps.enricher.clone(),
                deps.stats.clone(),
            )));
        }
        drop(classify_tx);

        // Classification pool
        let classify_rx = Arc::new(Mutex::new(classify_rx));
        for _ in 0..queues.classify_workers {
            handles.push(tokio::spawn(classify_worker(
                classify_rx.clone(),
                reseq_tx.clone(),
                deps.engine.clone(),
                deps.stats.clone(),
            )));
        }
        drop(reseq_tx);

        // Shard queues and workers
        let shard_count = queues.dedup_shards.max(1);
        let shard_capacity = (queues.stage_capacity / shard_count).max(16);
        let mut shard_txs = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            let (tx, rx) = mpsc::channel::<WhaleRecord>(shard_capacity);
            shard_txs.push(tx);
            handles.push(tokio::spawn(shard_worker(
                rx,
                deps.dedup.clone(),
                deps.sink.clone(),
                deps.registry.clone(),
                deps.stats.clone(),
            )));
        }

        // Resequencer: restores router order, routes to shards
        handles.push(tokio::spawn(resequencer(
            reseq_rx,
            shard_txs,
            deps.stats.clone(),
        )));

        Self { handles }
    }

    /// Wait for every stage to finish, bounded by `timeout` per task.
    pub async fn drain(self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        for handle in self.handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, handle).await.is_err() {
                warn!("pipeline stage did not drain in time");
            }
        }
        info!("pipeline drained");
    }
}

async fn router(
    mut fanin_rx: mpsc::Receiver<RawTransfer>,
    enrich_tx: mpsc::Sender<Envelope<RawTransfer>>,
    stats: Arc<PipelineStats>,
    shutdown: ShutdownSignal,
) {
    let mut seq = 0u64;
    let mut shutdown_wait = shutdown.clone();
    loop {
        tokio::select! {
            _ = shutdown_wait.wait() => {
                info!("router stopping intake");
                break;
            }
            item = fanin_rx.recv() => {
                let Some(raw) = item else { break };
                stats.received.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                if enrich_tx.send(Envelope { seq, payload: raw }).await.is_err() {
                    break;
                }
                seq += 1;
            }
        }
    }
    // Dropping the sender lets the pools drain what is already queued
}

async fn enrich_worker(
    rx: Arc<Mutex<mpsc::Receiver<Envelope<RawTransfer>>>>,
    classify_tx: mpsc::Sender<Envelope<EnrichedTransfer>>,
    enricher: Arc<Enricher>,
    stats: Arc<PipelineStats>,
) {
    loop {
        let item = { rx.lock().await.recv().await };
        let Some(envelope) = item else { break };
        let enriched = enricher.enrich(envelope.payload).await;
        stats
            .enriched
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if classify_tx
            .send(Envelope {
                seq: envelope.seq,
                payload: enriched,
            })
            .await
            .is_err()
        {
            break;
        }
    }
}

async fn classify_worker(
    rx: Arc<Mutex<mpsc::Receiver<Envelope<EnrichedTransfer>>>>,
    reseq_tx: mpsc::Sender<Envelope<Option<WhaleRecord>>>,
    engine: Arc<ClassificationEngine>,
    stats: Arc<PipelineStats>,
) {
    loop {
        let item = { rx.lock().await.recv().await };
        let Some(envelope) = item else { break };
        let enriched = envelope.payload;

        let outcome = match engine.classify(&enriched).await {
            Decision::SkipInternal => {
                stats
                    .dropped
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                None
            }
            Decision::Classified(classification) => match perspectivize(&enriched) {
                PerspectiveOutcome::SkipInternalCex => {
                    stats
                        .dropped
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    None
                }
                PerspectiveOutcome::Perspective(perspective) => {
                    stats
                        .classified
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    Some(build_record(&enriched, classification, perspective))
                }
            },
        };

        if reseq_tx
            .send(Envelope {
                seq: envelope.seq,
                payload: outcome,
            })
            .await
            .is_err()
        {
            break;
        }
    }
}

fn build_record(
    enriched: &EnrichedTransfer,
    classification: Classification,
    perspective: classifier_service::WhalePerspective,
) -> WhaleRecord {
    let label_text = |label: &Option<types::AddressLabel>| {
        label.as_ref().map(|l| {
            l.entity_name
                .clone()
                .unwrap_or_else(|| l.kind.as_str().to_string())
        })
    };
    WhaleRecord {
        chain: enriched.raw.chain,
        tx_hash: enriched.raw.tx_hash.clone(),
        block_time: enriched.raw.block_time,
        whale_address: perspective.whale_address,
        counterparty_address: perspective.counterparty_address,
        counterparty_kind: perspective.counterparty_kind,
        is_cex_transaction: perspective.is_cex_transaction,
        classification: classification.kind,
        confidence: classification.confidence,
        token_symbol: enriched.symbol().to_string(),
        usd_value: enriched.usd_value,
        from_label: label_text(&enriched.from_label),
        to_label: label_text(&enriched.to_label),
        evidence: classification.evidence,
        source_id: enriched.raw.source_id.clone(),
        ingested_at: Utc::now(),
    }
}

/// Restore router order after the parallel pools and route to shards.
async fn resequencer(
    mut rx: mpsc::Receiver<Envelope<Option<WhaleRecord>>>,
    shard_txs: Vec<mpsc::Sender<WhaleRecord>>,
    stats: Arc<PipelineStats>,
) {
    let mut next_seq = 0u64;
    let mut pending: BTreeMap<u64, Option<WhaleRecord>> = BTreeMap::new();

    while let Some(envelope) = rx.recv().await {
        pending.insert(envelope.seq, envelope.payload);
        while let Some(payload) = pending.remove(&next_seq) {
            next_seq += 1;
            if let Some(record) = payload {
                dispatch(&shard_txs, record, &stats).await;
            }
        }
    }

    // Channel closed: flush whatever is left in order; gaps are events
    // lost to worker failures and are already counted as errors
    for (_, payload) in std::mem::take(&mut pending) {
        if let Some(record) = payload {
            dispatch(&shard_txs, record, &stats).await;
        }
    }
    debug!("resequencer drained");
}

async fn dispatch(
    shard_txs: &[mpsc::Sender<WhaleRecord>],
    record: WhaleRecord,
    stats: &Arc<PipelineStats>,
) {
    let mut hasher = DefaultHasher::new();
    record.chain.hash(&mut hasher);
    match &record.whale_address {
        Some(whale) => whale.hash(&mut hasher),
        None => record.tx_hash.hash(&mut hasher),
    }
    let shard = (hasher.finish() as usize) % shard_txs.len();
    if shard_txs[shard].send(record).await.is_err() {
        stats
            .errors
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

async fn shard_worker(
    mut rx: mpsc::Receiver<WhaleRecord>,
    dedup: Arc<NearDupeDetector>,
    sink: Arc<RecordSink>,
    registry: Arc<WhaleRegistry>,
    stats: Arc<PipelineStats>,
) {
    use std::sync::atomic::Ordering::Relaxed;

    while let Some(record) = rx.recv().await {
        match dedup.check(&record, sink.storage().as_ref()).await {
            DedupDecision::Store => match sink.store(record.clone()).await {
                Ok(_) => {
                    dedup.record_stored(&record);
                    observe(&registry, &record);
                    stats.stored.fetch_add(1, Relaxed);
                }
                Err(error) => {
                    warn!(%error, tx_hash = %record.tx_hash, "sink store failed");
                    stats.errors.fetch_add(1, Relaxed);
                }
            },
            DedupDecision::Replace {
                existing_chain,
                existing_tx_hash,
                merged_block_time,
                event,
            } => {
                sink.emit_suppression(&event);
                let mut merged = record.clone();
                merged.block_time = merged_block_time;
                match sink
                    .replace(existing_chain, existing_tx_hash.clone(), merged.clone())
                    .await
                {
                    Ok(()) => {
                        if let Some(key) = merged.dedup_key() {
                            dedup.record_removed(existing_chain, &existing_tx_hash, &key);
                        }
                        dedup.record_stored(&merged);
                        observe(&registry, &merged);
                        stats.stored.fetch_add(1, Relaxed);
                        stats.suppressed.fetch_add(1, Relaxed);
                    }
                    Err(error) => {
                        warn!(%error, tx_hash = %record.tx_hash, "dedup merge failed");
                        stats.errors.fetch_add(1, Relaxed);
                    }
                }
            }
            DedupDecision::Suppress { event } => {
                sink.emit_suppression(&event);
                stats.suppressed.fetch_add(1, Relaxed);
            }
        }
    }
}

fn observe(registry: &WhaleRegistry, record: &WhaleRecord) {
    if let Some(whale) = &record.whale_address {
        registry.observe(
            whale,
            record.classification,
            record.usd_value,
            &record.token_symbol,
            record.block_time,
        );
    }
}
