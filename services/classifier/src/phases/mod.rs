//! Classification phases, in pipeline order

pub mod behavior;
pub mod cex;
pub mod chain;
pub mod dex;
pub mod mega_whale;

/// Aggregation weights, applied to each phase's vote confidence.
pub mod weights {
    pub const CEX: f64 = 0.65;
    pub const DEX: f64 = 0.60;
    pub const CHAIN: f64 = 0.50;
    pub const BEHAVIOR: f64 = 0.45;
}
