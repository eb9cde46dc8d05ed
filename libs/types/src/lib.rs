//! # Whaletrack Type System
//!
//! Canonical data model shared by every whaletrack service: chains,
//! normalized transfers, address labels, classifications, stored whale
//! records and per-wallet statistics.
//!
//! This crate is pure data. It performs no I/O and owns no locks, so every
//! service can depend on it without pulling in runtime machinery. Identity
//! and lifecycle invariants live here next to the types they protect:
//!
//! - a raw event is uniquely identified by `(chain, tx_hash, log_index)`
//!   and is never mutated after emission;
//! - a stored record is keyed by `(chain, tx_hash)`;
//! - label and classification confidences always stay within `[0, 1]`.

#![warn(clippy::all)]

pub mod chain;
pub mod classification;
pub mod label;
pub mod record;
pub mod stats;
pub mod transfer;

pub use chain::Chain;
pub use classification::{Classification, ClassificationKind};
pub use label::{AddressLabel, LabelKind};
pub use record::{DuplicatePattern, SuppressionEvent, WhaleRecord};
pub use stats::WhaleStats;
pub use transfer::{EnrichedTransfer, RawTransfer};
