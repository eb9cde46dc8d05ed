//! Bounded fan-in channel shared by all sources

use crate::error::{IngestError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;
use types::RawTransfer;

/// Per-source emission counters, shared with the supervisor's health
/// probe.
#[derive(Debug, Default)]
pub struct SourceMetrics {
    pub emitted: AtomicU64,
    pub dropped: AtomicU64,
    pub errors: AtomicU64,
    pub restarts: AtomicU64,
    /// Unix milliseconds of the last successful emit, 0 when none yet.
    pub last_emit_unix_ms: AtomicI64,
}

impl SourceMetrics {
    pub fn note_emit(&self, now_unix_ms: i64) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        self.last_emit_unix_ms.store(now_unix_ms, Ordering::Relaxed);
    }
}

/// The shared ingestion channel. One receiver, one sender handle per
/// source.
pub struct FanIn {
    tx: mpsc::Sender<RawTransfer>,
}

impl FanIn {
    /// Build the channel and hand back the consumer side.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<RawTransfer>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Register a source, producing its dedicated output handle.
    ///
    /// `drop_budget` bounds the local staging queue used when the shared
    /// channel is full; `None` means the source blocks instead of
    /// dropping.
    pub fn register(
        &self,
        source_id: impl Into<String>,
        drop_budget: Option<usize>,
        metrics: Arc<SourceMetrics>,
    ) -> SourceOutput {
        SourceOutput {
            source_id: source_id.into(),
            tx: self.tx.clone(),
            drop_budget,
            staged: VecDeque::new(),
            metrics,
        }
    }
}

/// A source's handle onto the fan-in channel.
///
/// Without a drop budget, `send` applies backpressure by blocking until
/// the pipeline catches up. With one, events are staged locally and the
/// oldest staged event is discarded (and counted) once the budget is
/// exceeded.
pub struct SourceOutput {
    source_id: String,
    tx: mpsc::Sender<RawTransfer>,
    drop_budget: Option<usize>,
    staged: VecDeque<RawTransfer>,
    metrics: Arc<SourceMetrics>,
}

impl SourceOutput {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Emit one normalized transfer.
    pub async fn send(&mut self, mut event: RawTransfer) -> Result<()> {
        event.normalize();
        match self.drop_budget {
            None => {
                self.tx
                    .send(event)
                    .await
                    .map_err(|_| IngestError::ChannelClosed)?;
                self.metrics.note_emit(chrono::Utc::now().timestamp_millis());
                Ok(())
            }
            Some(budget) => self.send_with_budget(event, budget),
        }
    }

    fn send_with_budget(&mut self, event: RawTransfer, budget: usize) -> Result<()> {
        self.staged.push_back(event);
        self.flush_staged()?;

        while self.staged.len() > budget {
            self.staged.pop_front();
            let dropped = self.metrics.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                source_id = %self.source_id,
                dropped_total = dropped,
                "fan-in full, dropping oldest staged event"
            );
        }
        Ok(())
    }

    /// Push staged events into the channel without blocking. Called on
    /// every send and during graceful drain.
    pub fn flush_staged(&mut self) -> Result<()> {
        while let Some(event) = self.staged.front() {
            match self.tx.try_send(event.clone()) {
                Ok(()) => {
                    self.staged.pop_front();
                    self.metrics.note_emit(chrono::Utc::now().timestamp_millis());
                }
                Err(mpsc::error::TrySendError::Full(_)) => break,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(IngestError::ChannelClosed)
                }
            }
        }
        Ok(())
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }
}
