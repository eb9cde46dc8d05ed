//! Per-stage pipeline counters and the stats snapshot file

use crate::sink::{SentimentCounters, TokenSentiment};
use chrono::{DateTime, Utc};
use ingest_service::SourceHealth;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Monotonic per-stage counters, shared across every worker.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub received: AtomicU64,
    pub enriched: AtomicU64,
    pub classified: AtomicU64,
    pub stored: AtomicU64,
    pub suppressed: AtomicU64,
    pub dropped: AtomicU64,
    pub errors: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> StageCounters {
        StageCounters {
            received: self.received.load(Ordering::Relaxed),
            enriched: self.enriched.load(Ordering::Relaxed),
            classified: self.classified.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Plain-data snapshot of the stage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounters {
    pub received: u64,
    pub enriched: u64,
    pub classified: u64,
    pub stored: u64,
    pub suppressed: u64,
    pub dropped: u64,
    pub errors: u64,
}

/// Everything `whaletrack stats` renders, persisted periodically by the
/// running pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub stages: StageCounters,
    pub sources: Vec<SourceHealth>,
    pub sentiment: Vec<(String, TokenSentiment)>,
}

impl StatsSnapshot {
    pub fn capture(
        stats: &PipelineStats,
        sources: Vec<SourceHealth>,
        counters: &SentimentCounters,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            stages: stats.counters(),
            sources,
            sentiment: counters.all(),
        }
    }

    /// Persist via temp-and-rename, like every other state file.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "stats snapshot written");
        Ok(())
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(std::io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let stats = PipelineStats::new();
        stats.received.fetch_add(10, Ordering::Relaxed);
        stats.stored.fetch_add(7, Ordering::Relaxed);
        stats.suppressed.fetch_add(2, Ordering::Relaxed);

        let snapshot = StatsSnapshot::capture(&stats, vec![], &SentimentCounters::new());
        snapshot.write(&path).unwrap();

        let read = StatsSnapshot::read(&path).unwrap();
        assert_eq!(read.stages.received, 10);
        assert_eq!(read.stages.stored, 7);
        assert_eq!(read.stages.suppressed, 2);
    }
}
