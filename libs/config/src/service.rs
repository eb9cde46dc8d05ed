//! Service configuration defaults
//!
//! This module contains default configuration values and constants
//! used across whaletrack services for consistency.

/// Ingestion service defaults
pub mod ingest {
    /// Fan-in channel capacity shared by all sources
    pub const FANIN_QUEUE_CAPACITY: usize = 1024;

    /// Connection timeout (milliseconds)
    pub const CONNECTION_TIMEOUT_MS: u64 = 30_000;

    /// Restart backoff base (seconds)
    pub const RESTART_BACKOFF_BASE_SECS: u64 = 1;

    /// Restart backoff cap (seconds)
    pub const RESTART_BACKOFF_CAP_SECS: u64 = 60;

    /// Consecutive errors before the per-source circuit opens
    pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 10;

    /// Window in which the consecutive errors must occur (seconds)
    pub const CIRCUIT_BREAKER_WINDOW_SECS: u64 = 60;

    /// Half-open probe delay after the circuit opens (seconds)
    pub const CIRCUIT_BREAKER_HALF_OPEN_SECS: u64 = 30;

    /// A source is unhealthy when it has not emitted for this long (seconds)
    pub const HEALTH_PROBE_STALE_SECS: u64 = 120;

    /// Graceful shutdown drain budget (seconds)
    pub const SHUTDOWN_DRAIN_SECS: u64 = 30;

    /// Poller request budget (requests per second)
    pub const POLLER_RATE_LIMIT_RPS: u32 = 5;
}

/// Enrichment service defaults
pub mod enrichment {
    /// Label LRU capacity (entries)
    pub const LABEL_CACHE_CAPACITY: usize = 100_000;

    /// Label cache stripe count
    pub const LABEL_CACHE_STRIPES: usize = 16;

    /// Label TTL (seconds)
    pub const LABEL_TTL_SECS: u64 = 3600;

    /// Token metadata TTL (seconds)
    pub const TOKEN_TTL_SECS: u64 = 1800;

    /// Negative-cache TTL after a failed remote lookup (seconds)
    pub const NEGATIVE_TTL_SECS: u64 = 60;

    /// Explorer lookup budget (requests per second)
    pub const EXPLORER_RATE_LIMIT_RPS: u32 = 5;

    /// Label lookup deadline (milliseconds)
    pub const LABEL_DEADLINE_MS: u64 = 2_000;

    /// Price staleness budget (seconds)
    pub const PRICE_STALENESS_SECS: u64 = 120;
}

/// Classifier defaults
pub mod classifier {
    /// Receipt fetch deadline (milliseconds)
    pub const RECEIPT_DEADLINE_MS: u64 = 5_000;

    /// Total per-phase budget (seconds)
    pub const PHASE_BUDGET_SECS: u64 = 8;

    /// Aggregate confidence that stops running further phases
    pub const EARLY_EXIT: f64 = 0.85;

    /// Per-phase early exits
    pub const CEX_EARLY_EXIT: f64 = 0.75;
    pub const DEX_EARLY_EXIT: f64 = 0.70;

    /// Output bucketing thresholds
    pub const HIGH_CONFIDENCE: f64 = 0.80;
    pub const MEDIUM_CONFIDENCE: f64 = 0.60;

    /// Multi-signal bonus per extra concordant vote, and its cap
    pub const STACK_BONUS_PER_VOTE: f64 = 0.08;
    pub const STACK_BONUS_CAP: f64 = 0.32;
}

/// Pipeline defaults
pub mod pipeline {
    /// Inter-stage queue capacity
    pub const STAGE_QUEUE_CAPACITY: usize = 512;

    /// Enrichment worker pool size
    pub const ENRICH_WORKERS: usize = 4;

    /// Classification worker pool size
    pub const CLASSIFY_WORKERS: usize = 8;

    /// Perspective/dedup shard count
    pub const DEDUP_SHARDS: usize = 32;

    /// L1 ring entries kept per (whale, token) key
    pub const DEDUP_RING_CAPACITY: usize = 50;

    /// L2 storage lookback row budget
    pub const DEDUP_LOOKBACK_LIMIT: usize = 200;

    /// Near-duplicate time window (seconds)
    pub const DEDUP_WINDOW_SECS: u64 = 10;

    /// Sink retry backoff (milliseconds, base and cap) and attempts
    pub const SINK_BACKOFF_BASE_MS: u64 = 200;
    pub const SINK_BACKOFF_CAP_MS: u64 = 30_000;
    pub const SINK_MAX_ATTEMPTS: u32 = 5;

    /// Registry snapshot cadence (seconds)
    pub const REGISTRY_SNAPSHOT_SECS: u64 = 60;

    /// Stats snapshot cadence (seconds)
    pub const STATS_SNAPSHOT_SECS: u64 = 10;
}
