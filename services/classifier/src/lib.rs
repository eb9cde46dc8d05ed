//! # Whaletrack Classification Engine
//!
//! ## Purpose
//!
//! Turns an enriched transfer into a whale-perspective verdict: BUY,
//! SELL, TRANSFER, or a finer protocol interaction, with stacked
//! confidence and ordered evidence.
//!
//! ## Architecture Role
//!
//! ```text
//! EnrichedTransfer → [P1 CEX] → [P2 DEX/Protocol] → [P3 Receipt] → ...
//!         │          early-exit?  early-exit?          │
//!         │                                            ▼
//!         │                              [Aggregation: confidence stacking]
//!         │                                            │
//!         ▼                                            ▼
//!    [Perspective transform]  ◀──────  [P4 behavior boosts, P5 mega-whale]
//! ```
//!
//! Each phase returns a discriminated outcome (`Vote | Abstain | Skip`);
//! the aggregator never raises. Phases run under a hard time budget and
//! abstain on timeout, so a stuck receipt fetch cannot stall the
//! pipeline.

#![warn(clippy::all)]

pub mod aggregate;
pub mod engine;
pub mod facts;
pub mod perspective;
pub mod phase;
pub mod phases;
pub mod receipts;

pub use aggregate::Aggregator;
pub use engine::{AnalyticsBackend, ClassificationEngine, Decision, WalletStatsLookup};
pub use facts::{IntentMethod, ReceiptFactsProvider, SwapFacts, TokenFlow};
pub use perspective::{perspectivize, PerspectiveOutcome, WhalePerspective};
pub use phase::{PhaseOutcome, PhaseReport, Vote};
pub use receipts::RpcReceiptFacts;
