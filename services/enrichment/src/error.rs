//! Error types for the enrichment service

use thiserror::Error;

/// Result type alias for enrichment operations
pub type Result<T> = std::result::Result<T, EnrichError>;

/// Errors surfaced by label stores and explorer clients.
///
/// These never escape the enrichment boundary: the provider converts
/// every failure into an `UNKNOWN` label plus a negative-cache entry.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lookup deadline exceeded after {0}ms")]
    Deadline(u64),

    #[error("label store error: {0}")]
    Store(String),

    #[error("unexpected response shape: {0}")]
    Decode(String),
}
