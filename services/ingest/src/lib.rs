//! # Whaletrack Ingestion Service
//!
//! ## Purpose
//!
//! Collects large-value transfer events from several independent sources
//! (push streams, explorer pollers, alert firehoses, on-demand receipt
//! parsing), normalizes everything into the canonical [`RawTransfer`]
//! shape and fans the streams into one bounded channel for the pipeline.
//!
//! ## Architecture Role
//!
//! ```text
//! Log Stream ──┐
//! Poller ──────┤  normalize   ┌─────────────┐      bounded      ┌──────────┐
//! Alert Feed ──┼─────────────▶│  SourceOutput│─────▶ channel ───▶│ pipeline │
//! RPC Parser ──┘              └─────────────┘     (cap 1024)     └──────────┘
//!        ▲ each source supervised: restart backoff, circuit breaker,
//!        │ health probe, graceful drain
//! ```
//!
//! Sources are stateless transformers: raw upstream data in, canonical
//! transfers out. Reconnection, rate limiting and failure isolation live
//! here; no classification or storage logic does.

#![warn(clippy::all)]

pub mod circuit_breaker;
pub mod decode;
pub mod error;
pub mod fanin;
pub mod rate_limit;
pub mod source;
pub mod sources;
pub mod supervisor;
pub mod watermark;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{IngestError, Result};
pub use fanin::{FanIn, SourceMetrics, SourceOutput};
pub use rate_limit::RateLimiter;
pub use source::{ShutdownSignal, Source, SourceHealth};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use watermark::{Watermark, WatermarkStore};
