//! Error types for the ingestion service

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for source and supervisor operations
#[derive(Debug, Error)]
pub enum IngestError {
    /// Connection-related errors
    #[error("connection failed for source {source_id}: {reason}")]
    ConnectionFailed { source_id: String, reason: String },

    /// Connection timeout during establish or receive operations
    #[error("connection timeout for source {source_id} after {timeout_ms}ms")]
    ConnectionTimeout { source_id: String, timeout_ms: u64 },

    /// Authentication failure against an upstream API
    #[error("authentication failed for source {source_id}")]
    AuthenticationFailed { source_id: String },

    /// Upstream rate limit hit (HTTP 429 or equivalent)
    #[error("rate limited by upstream for source {source_id}")]
    UpstreamRateLimited { source_id: String },

    /// A single event could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Required field missing from an upstream message
    #[error("missing required field: {field}")]
    MissingField { field: String },

    /// JSON parsing error from upstream data
    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// I/O error (watermark files, local state)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The fan-in channel was closed by the consumer
    #[error("fan-in channel closed")]
    ChannelClosed,

    /// Circuit breaker rejected the operation
    #[error("circuit breaker open for source {source_id}")]
    CircuitOpen { source_id: String },

    /// Misconfigured source (bad URL, missing credentials)
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl IngestError {
    /// Transient failures the supervisor retries with backoff.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IngestError::ConnectionFailed { .. }
                | IngestError::ConnectionTimeout { .. }
                | IngestError::UpstreamRateLimited { .. }
                | IngestError::Decode(_)
                | IngestError::JsonParse(_)
                | IngestError::Http(_)
                | IngestError::WebSocket(_)
                | IngestError::Io(_)
        )
    }

    /// Failures that keep the circuit open until an operator intervenes.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            IngestError::AuthenticationFailed { .. }
                | IngestError::Configuration(_)
                | IngestError::ChannelClosed
        )
    }
}
