//! Environment-driven runtime configuration
//!
//! Every operational threshold can be overridden through the environment;
//! unset or unparseable values fall back to the embedded defaults with a
//! warning, so a bad variable never prevents startup.

use crate::service;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, raw, "unparseable environment override, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.trim(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Near-duplicate suppressor tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Match window between two reports of the same economic event.
    pub time_window: Duration,
    /// Absolute USD tolerance.
    pub usd_threshold: Decimal,
    /// Relative USD tolerance (fraction of the larger value).
    pub percentage_threshold: f64,
    /// Records above this value are never suppressed.
    pub safeguard_usd: Decimal,
    pub ring_capacity: usize,
    pub lookback_limit: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            time_window: Duration::from_secs(service::pipeline::DEDUP_WINDOW_SECS),
            usd_threshold: Decimal::from(5u32),
            percentage_threshold: 0.0015,
            safeguard_usd: Decimal::from(5_000_000u64),
            ring_capacity: service::pipeline::DEDUP_RING_CAPACITY,
            lookback_limit: service::pipeline::DEDUP_LOOKBACK_LIMIT,
        }
    }
}

impl DedupConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            time_window: Duration::from_secs(env_parse(
                "NEAR_DUPE_TIME_WINDOW",
                defaults.time_window.as_secs(),
            )),
            usd_threshold: env_parse("NEAR_DUPE_USD_THRESHOLD", defaults.usd_threshold),
            percentage_threshold: env_parse(
                "NEAR_DUPE_PERCENTAGE_THRESHOLD",
                defaults.percentage_threshold,
            ),
            safeguard_usd: env_parse("NEAR_DUPE_SAFEGUARD_USD", defaults.safeguard_usd),
            ring_capacity: defaults.ring_capacity,
            lookback_limit: defaults.lookback_limit,
        }
    }
}

/// Classification thresholds and optional heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub high: f64,
    pub medium: f64,
    pub early_exit: f64,
    pub cex_early_exit: f64,
    pub dex_early_exit: f64,
    /// Directional guess from bare token-to-router flow. Unsound without
    /// decoded swap events; off unless an operator opts in.
    pub dex_coverage_mode: bool,
    /// Classify bridge deposits/exits as BUY/SELL instead of BRIDGE.
    pub bridge_direction_enabled: bool,
    pub mega_whale_enabled: bool,
    pub mega_whale_weight: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            high: service::classifier::HIGH_CONFIDENCE,
            medium: service::classifier::MEDIUM_CONFIDENCE,
            early_exit: service::classifier::EARLY_EXIT,
            cex_early_exit: service::classifier::CEX_EARLY_EXIT,
            dex_early_exit: service::classifier::DEX_EARLY_EXIT,
            dex_coverage_mode: false,
            bridge_direction_enabled: false,
            mega_whale_enabled: false,
            mega_whale_weight: 0.35,
        }
    }
}

impl ClassifierConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            high: env_parse("CLASSIFICATION_HIGH", defaults.high),
            medium: env_parse("CLASSIFICATION_MEDIUM", defaults.medium),
            early_exit: env_parse("CLASSIFICATION_EARLY_EXIT", defaults.early_exit),
            cex_early_exit: defaults.cex_early_exit,
            dex_early_exit: defaults.dex_early_exit,
            dex_coverage_mode: env_bool("DEX_COVERAGE_MODE", defaults.dex_coverage_mode),
            bridge_direction_enabled: env_bool(
                "BRIDGE_DIRECTION_ENABLED",
                defaults.bridge_direction_enabled,
            ),
            mega_whale_enabled: env_bool("MEGA_WHALE_ENABLED", defaults.mega_whale_enabled),
            mega_whale_weight: env_parse("MEGA_WHALE_WEIGHT", defaults.mega_whale_weight),
        }
    }
}

/// Label and price cache tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub label_ttl: Duration,
    pub token_ttl: Duration,
    pub negative_ttl: Duration,
    pub label_cache_capacity: usize,
    pub label_deadline: Duration,
    pub explorer_rate_limit_rps: u32,
    pub price_staleness: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            label_ttl: Duration::from_secs(service::enrichment::LABEL_TTL_SECS),
            token_ttl: Duration::from_secs(service::enrichment::TOKEN_TTL_SECS),
            negative_ttl: Duration::from_secs(service::enrichment::NEGATIVE_TTL_SECS),
            label_cache_capacity: service::enrichment::LABEL_CACHE_CAPACITY,
            label_deadline: Duration::from_millis(service::enrichment::LABEL_DEADLINE_MS),
            explorer_rate_limit_rps: service::enrichment::EXPLORER_RATE_LIMIT_RPS,
            price_staleness: Duration::from_secs(service::enrichment::PRICE_STALENESS_SECS),
        }
    }
}

impl EnrichmentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            label_ttl: Duration::from_secs(env_parse(
                "LABEL_TTL_SECONDS",
                defaults.label_ttl.as_secs(),
            )),
            price_staleness: Duration::from_secs(env_parse(
                "PRICE_STALENESS_SECONDS",
                defaults.price_staleness.as_secs(),
            )),
            explorer_rate_limit_rps: env_parse(
                "EXPLORER_RATE_LIMIT_RPS",
                defaults.explorer_rate_limit_rps,
            ),
            ..defaults
        }
    }
}

/// Queue capacities and worker pool sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub fanin_capacity: usize,
    pub stage_capacity: usize,
    pub enrich_workers: usize,
    pub classify_workers: usize,
    pub dedup_shards: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            fanin_capacity: service::ingest::FANIN_QUEUE_CAPACITY,
            stage_capacity: service::pipeline::STAGE_QUEUE_CAPACITY,
            enrich_workers: service::pipeline::ENRICH_WORKERS,
            classify_workers: service::pipeline::CLASSIFY_WORKERS,
            dedup_shards: service::pipeline::DEDUP_SHARDS,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fanin_capacity: env_parse("FANIN_QUEUE_CAPACITY", defaults.fanin_capacity),
            stage_capacity: env_parse("STAGE_QUEUE_CAPACITY", defaults.stage_capacity),
            enrich_workers: env_parse("ENRICH_WORKERS", defaults.enrich_workers).clamp(2, 8),
            classify_workers: env_parse("CLASSIFY_WORKERS", defaults.classify_workers).clamp(4, 16),
            dedup_shards: env_parse("DEDUP_SHARDS", defaults.dedup_shards).max(1),
        }
    }
}

/// On-disk state locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl PathsConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(
                std::env::var("WHALETRACK_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            ),
        }
    }

    pub fn registry_snapshot(&self) -> PathBuf {
        self.data_dir.join("whale_registry.json")
    }

    pub fn watermarks(&self) -> PathBuf {
        self.data_dir.join("watermarks.json")
    }

    pub fn stats_snapshot(&self) -> PathBuf {
        self.data_dir.join("pipeline_stats.json")
    }

    pub fn dead_letter(&self) -> PathBuf {
        self.data_dir.join("dead_letter.jsonl")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.data_dir.join("audit.jsonl")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.data_dir.join("whaletrack.pid")
    }
}

/// Top-level runtime configuration assembled from the environment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub dedup: DedupConfig,
    pub classifier: ClassifierConfig,
    pub enrichment: EnrichmentConfig,
    pub queues: QueueConfig,
    pub paths: PathsConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            dedup: DedupConfig::from_env(),
            classifier: ClassifierConfig::from_env(),
            enrichment: EnrichmentConfig::from_env(),
            queues: QueueConfig::from_env(),
            paths: PathsConfig::from_env(),
        }
    }
}
