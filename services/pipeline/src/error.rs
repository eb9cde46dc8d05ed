//! Error types for storage, sink and pipeline wiring

use thiserror::Error;

/// Storage backend failures.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Worth retrying: connection blips, timeouts, lock contention.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Not worth retrying: schema violations, permanent rejections.
    #[error("fatal storage failure: {0}")]
    Fatal(String),
}

impl StorageError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

/// Sink failures after retry policy has been applied.
#[derive(Debug, Error)]
pub enum SinkError {
    /// All retry attempts exhausted; the record went to the dead-letter
    /// queue.
    #[error("record dead-lettered after {attempts} attempts: {last_error}")]
    DeadLettered { attempts: u32, last_error: String },

    /// The dead-letter write itself failed; the record is reported lost.
    #[error("dead-letter write failed: {0}")]
    DeadLetterUnavailable(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wiring-level failures (startup, config, channel breakage).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("stage channel closed unexpectedly: {0}")]
    ChannelClosed(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
