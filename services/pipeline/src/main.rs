//! whaletrack CLI
//!
//! `start` runs the full pipeline in-process until a stop signal;
//! `stop` asks a running instance to drain; `stats` renders the latest
//! stats snapshot; `cleanup-duplicates` runs the offline dedup pass.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use classifier_service::ClassificationEngine;
use config::RuntimeConfig;
use enrichment_service::{
    Enricher, HttpExplorerClient, InMemoryLabelStore, LabelProvider, PriceResolver, StaticRegistry,
};
use ingest_service::sources::{
    AlertFeedConfig, AlertFeedSource, LogStreamConfig, LogStreamSource, ReceiptPollerConfig,
    ReceiptPollerSource,
};
use ingest_service::{FanIn, Supervisor, SupervisorConfig, WatermarkStore};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use types::Chain;
use whale_pipeline::{
    cleanup_duplicates, MemoryStorage, NearDupeDetector, Pipeline, PipelineDeps, PipelineStats,
    RecordSink, SentimentCounters, StatsSnapshot, Storage, WhaleRegistry,
};

#[derive(Parser)]
#[command(name = "whaletrack", version, about = "Whale transaction monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion and classification pipeline
    Start,
    /// Ask a running pipeline to shut down gracefully
    Stop,
    /// Show per-stage counters and per-source circuit states
    Stats,
    /// Scan storage for near-duplicate records
    CleanupDuplicates {
        /// Report findings without deleting (default)
        #[arg(long)]
        dry_run: bool,
        /// Delete the losing record of each duplicate pair
        #[arg(long, conflicts_with = "dry_run")]
        live: bool,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                // Usage errors exit 1
                _ => ExitCode::from(1),
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("error: failed to start runtime: {error}");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = %format!("{error:#}"), "command failed");
            eprintln!("error: {error:#}");
            // Runtime errors exit 2
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = RuntimeConfig::from_env();
    match cli.command {
        Command::Start => start(config).await,
        Command::Stop => stop(config),
        Command::Stats => stats(config),
        Command::CleanupDuplicates { dry_run: _, live } => cleanup(config, live).await,
    }
}

fn stop_file(config: &RuntimeConfig) -> std::path::PathBuf {
    config.paths.data_dir.join("whaletrack.stop")
}

async fn start(config: RuntimeConfig) -> Result<()> {
    info!("whaletrack starting");
    std::fs::create_dir_all(&config.paths.data_dir).context("creating data dir")?;

    // Ingestion
    let (fanin, fanin_rx) = FanIn::bounded(config.queues.fanin_capacity);
    let mut supervisor = Supervisor::new(fanin, SupervisorConfig::default());
    let watermarks = Arc::new(WatermarkStore::load(config.paths.watermarks()));
    let drop_budget = std::env::var("SOURCE_DROP_BUDGET")
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok());

    if let Ok(url) = std::env::var("LOG_STREAM_WS_URL") {
        supervisor.spawn(
            Box::new(LogStreamSource::new(LogStreamConfig::new(
                "eth-log-stream",
                url,
                Chain::Ethereum,
            ))),
            drop_budget,
        );
    }
    if let Ok(url) = std::env::var("ALERT_FEED_WS_URL") {
        supervisor.spawn(
            Box::new(AlertFeedSource::new(AlertFeedConfig {
                source_id: "whale-alert-feed".into(),
                ws_url: url,
            })),
            drop_budget,
        );
    }
    if let Ok(api_url) = std::env::var("EXPLORER_API_URL") {
        let tokens: Vec<String> = std::env::var("WATCHED_TOKENS")
            .unwrap_or_default()
            .split(',')
            .filter(|token| !token.trim().is_empty())
            .map(|token| token.trim().to_lowercase())
            .collect();
        if tokens.is_empty() {
            warn!("EXPLORER_API_URL set but WATCHED_TOKENS empty, poller not started");
        } else {
            let mut poller_config =
                ReceiptPollerConfig::new("eth-receipt-poller", api_url, Chain::Ethereum, tokens);
            poller_config.api_key = std::env::var("EXPLORER_API_KEY").ok();
            supervisor.spawn(
                Box::new(
                    ReceiptPollerSource::new(poller_config, watermarks.clone())
                        .context("building receipt poller")?,
                ),
                drop_budget,
            );
        }
    }

    // Enrichment
    let mut registry = StaticRegistry::builtin();
    if let Ok(path) = std::env::var("LABELS_OVERLAY_PATH") {
        match config::load_label_overlay(std::path::Path::new(&path)) {
            Ok(overlay) => registry = registry.with_overlay(&overlay),
            Err(error) => warn!(%error, "label overlay not loaded"),
        }
    }
    let explorer = match std::env::var("EXPLORER_API_URL") {
        Ok(url) => Some(Arc::new(HttpExplorerClient::new(
            url,
            std::env::var("EXPLORER_API_KEY").ok(),
            config.enrichment.label_deadline,
        )?) as Arc<dyn enrichment_service::ExplorerClient>),
        Err(_) => None,
    };
    let labels = Arc::new(LabelProvider::new(
        registry,
        Some(Arc::new(InMemoryLabelStore::new())),
        explorer,
        config.enrichment.clone(),
    ));
    let prices = Arc::new(PriceResolver::new(config.enrichment.price_staleness));
    let enricher = Arc::new(Enricher::new(labels, prices));

    // Classification and pipeline
    let whale_registry = Arc::new(WhaleRegistry::new(Some(config.paths.registry_snapshot())));
    let mut engine =
        ClassificationEngine::new(config.classifier.clone()).with_stats_lookup(whale_registry.clone());
    if let Ok(rpc_url) = std::env::var("RPC_URL") {
        let facts = classifier_service::RpcReceiptFacts::new(
            rpc_url,
            Duration::from_millis(config::service::classifier::RECEIPT_DEADLINE_MS),
        )
        .context("building receipt fact provider")?;
        engine = engine.with_facts_provider(Arc::new(facts));
    }
    let engine = Arc::new(engine);
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let counters = Arc::new(SentimentCounters::new());
    let sink = Arc::new(RecordSink::new(
        storage,
        counters.clone(),
        config.paths.audit_log(),
        config.paths.dead_letter(),
        Default::default(),
    ));
    let dedup = Arc::new(NearDupeDetector::new(config.dedup.clone()));
    let stats = Arc::new(PipelineStats::new());

    let pipeline = Pipeline::spawn(
        PipelineDeps {
            enricher,
            engine,
            dedup,
            sink: sink.clone(),
            registry: whale_registry.clone(),
            stats: stats.clone(),
        },
        config.queues.clone(),
        fanin_rx,
        supervisor.shutdown_signal(),
    );

    // PID file so `stop` can find us
    let pid_path = config.paths.pid_file();
    std::fs::write(&pid_path, std::process::id().to_string()).context("writing pid file")?;
    let stop_path = stop_file(&config);
    let _ = std::fs::remove_file(&stop_path);

    let mut stats_tick = tokio::time::interval(Duration::from_secs(
        config::service::pipeline::STATS_SNAPSHOT_SECS,
    ));
    let mut registry_tick = tokio::time::interval(Duration::from_secs(
        config::service::pipeline::REGISTRY_SNAPSHOT_SECS,
    ));
    let mut stop_tick = tokio::time::interval(Duration::from_secs(1));

    info!("whaletrack running; stop with ctrl-c or `whaletrack stop`");
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for ctrl-c")?;
                info!("interrupt received");
                break;
            }
            _ = stop_tick.tick() => {
                if stop_path.exists() {
                    info!("stop file found");
                    break;
                }
            }
            _ = stats_tick.tick() => {
                let snapshot = StatsSnapshot::capture(&stats, supervisor.health(), &counters);
                if let Err(error) = snapshot.write(&config.paths.stats_snapshot()) {
                    warn!(%error, "stats snapshot failed");
                }
            }
            _ = registry_tick.tick() => {
                if let Err(error) = whale_registry.snapshot() {
                    warn!(%error, "registry snapshot failed");
                }
            }
        }
    }

    // Graceful drain: stop intake, flush the stages, persist state
    supervisor.shutdown().await;
    pipeline
        .drain(Duration::from_secs(
            config::service::ingest::SHUTDOWN_DRAIN_SECS,
        ))
        .await;
    watermarks.persist().context("persisting watermarks")?;
    whale_registry.snapshot().context("final registry snapshot")?;
    let snapshot = StatsSnapshot::capture(&stats, supervisor.health(), &counters);
    snapshot
        .write(&config.paths.stats_snapshot())
        .context("final stats snapshot")?;
    let _ = std::fs::remove_file(&pid_path);
    let _ = std::fs::remove_file(&stop_path);
    info!("whaletrack stopped cleanly");
    Ok(())
}

fn stop(config: RuntimeConfig) -> Result<()> {
    let pid_path = config.paths.pid_file();
    if !pid_path.exists() {
        anyhow::bail!("no running instance found (missing {})", pid_path.display());
    }
    let pid = std::fs::read_to_string(&pid_path).context("reading pid file")?;
    std::fs::write(stop_file(&config), b"stop").context("writing stop file")?;
    println!("stop requested for pid {}", pid.trim());
    Ok(())
}

fn stats(config: RuntimeConfig) -> Result<()> {
    let path = config.paths.stats_snapshot();
    let snapshot = StatsSnapshot::read(&path)
        .with_context(|| format!("no stats snapshot at {} (is the pipeline running?)", path.display()))?;

    println!("whaletrack stats @ {}", snapshot.generated_at.to_rfc3339());
    println!();
    let stages = snapshot.stages;
    println!("stages:");
    println!("  received    {}", stages.received);
    println!("  enriched    {}", stages.enriched);
    println!("  classified  {}", stages.classified);
    println!("  stored      {}", stages.stored);
    println!("  suppressed  {}", stages.suppressed);
    println!("  dropped     {}", stages.dropped);
    println!("  errors      {}", stages.errors);

    if !snapshot.sources.is_empty() {
        println!();
        println!("sources:");
        for source in &snapshot.sources {
            println!(
                "  {:24} circuit={:9} healthy={} emitted={} dropped={} errors={} restarts={}",
                source.source_id,
                source.circuit.as_str(),
                source.healthy,
                source.emitted,
                source.dropped,
                source.errors,
                source.restarts,
            );
        }
    }

    if !snapshot.sentiment.is_empty() {
        println!();
        println!("sentiment:");
        for (token, sentiment) in &snapshot.sentiment {
            let denominator = sentiment.buys + sentiment.sells;
            let buy_pct = if denominator > 0 {
                100.0 * sentiment.buys as f64 / denominator as f64
            } else {
                0.0
            };
            println!(
                "  {:8} buys={} sells={} transfers={} buy_pct={:.1}%",
                token, sentiment.buys, sentiment.sells, sentiment.transfers, buy_pct
            );
        }
    }
    Ok(())
}

async fn cleanup(config: RuntimeConfig, live: bool) -> Result<()> {
    // The reference build runs against the in-process storage backend;
    // deployments with a persistent backend swap it in here.
    let storage = MemoryStorage::new();
    let detector = NearDupeDetector::new(config.dedup.clone());
    let report = cleanup_duplicates(&storage, &detector, live)
        .await
        .map_err(|error| anyhow::anyhow!("cleanup failed: {error}"))?;

    println!(
        "scanned {} records across {} keys: {} duplicate pairs{}",
        report.scanned,
        report.keys,
        report.findings.len(),
        if report.live {
            format!(", removed {}", report.removed)
        } else {
            " (dry run)".to_string()
        }
    );
    for (pattern, count) in &report.pattern_counts {
        println!("  {pattern}: {count}");
    }
    for finding in &report.findings {
        println!(
            "  keep {} / remove {} ({}, dt={}ms)",
            finding.keep_hash, finding.remove_hash, finding.pattern, finding.time_diff_ms
        );
    }
    Ok(())
}
