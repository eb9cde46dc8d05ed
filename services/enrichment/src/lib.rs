//! # Whaletrack Enrichment Service
//!
//! Resolves what the raw chain data cannot say on its own: who an
//! address belongs to and what a token was worth at event time.
//!
//! The label provider never fails; after the embedded registry, the
//! striped LRU cache, the label store and the rate-limited explorer
//! lookup have all come up empty (or errored, or timed out), the caller
//! gets an `UNKNOWN` label and the pipeline keeps moving. Failed remote
//! lookups are negative-cached briefly so a dead explorer cannot stall
//! every worker at once.

#![warn(clippy::all)]

pub mod enricher;
pub mod error;
pub mod explorer;
pub mod kinds;
pub mod labels;
pub mod prices;
pub mod registry;
pub mod store;
pub mod tokens;

pub use enricher::Enricher;
pub use error::{EnrichError, Result};
pub use explorer::{ExplorerClient, HttpExplorerClient};
pub use kinds::{infer_kind, InferredKind};
pub use labels::LabelProvider;
pub use prices::PriceResolver;
pub use registry::StaticRegistry;
pub use store::{InMemoryLabelStore, LabelStore};
pub use tokens::TokenDirectory;
