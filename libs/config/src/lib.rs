//! # Whaletrack Centralized Configuration
//!
//! This crate provides centralized configuration management and constants
//! for all whaletrack services, eliminating duplication across the codebase.
//!
//! ## Features
//!
//! - **Runtime tuning**: every operational threshold (dedup windows,
//!   classification cutoffs, cache TTLs, queue capacities) is read from the
//!   environment with a sane default.
//! - **Service defaults**: embedded per-service constants.
//! - **Label overlay**: TOML files extending the embedded address registry.

pub mod overlay;
pub mod runtime;
pub mod service;

pub use overlay::{load_label_overlay, LabelOverlayEntry};
pub use runtime::{
    ClassifierConfig, DedupConfig, EnrichmentConfig, PathsConfig, QueueConfig, RuntimeConfig,
};
