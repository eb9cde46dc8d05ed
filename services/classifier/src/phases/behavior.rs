//! P4: wallet behavior boosts
//!
//! Additive confidence boosts layered onto the leading directional
//! signal: transaction size, gas urgency, the wallet's track record and
//! time of day. Boosts never create a direction on their own.

use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use types::{EnrichedTransfer, WhaleStats};

/// One applied boost with its evidence line.
#[derive(Debug, Clone, PartialEq)]
pub struct Boost {
    pub amount: f64,
    pub evidence: String,
}

/// USD size threshold for the conviction boost.
const USD_BOOST_THRESHOLD: u64 = 100_000;

/// Peak trading hours, UTC.
const PEAK_START_HOUR: u32 = 13;
const PEAK_END_HOUR: u32 = 21;

pub fn boosts(
    tx: &EnrichedTransfer,
    wallet_stats: Option<&WhaleStats>,
    now: DateTime<Utc>,
) -> Vec<Boost> {
    let mut applied = Vec::new();

    if tx.usd_value >= Decimal::from(USD_BOOST_THRESHOLD) {
        applied.push(Boost {
            amount: 0.15,
            evidence: format!("large position (${})", tx.usd_value.round()),
        });
    }

    if tx.raw.chain.is_evm() {
        if let Some(gas) = tx.raw.gas_price_gwei {
            if gas >= Decimal::from(100u32) {
                applied.push(Boost {
                    amount: 0.10,
                    evidence: format!("extreme gas urgency ({gas} gwei)"),
                });
            } else if gas >= Decimal::from(50u32) {
                applied.push(Boost {
                    amount: 0.05,
                    evidence: format!("elevated gas ({gas} gwei)"),
                });
            }
        }
    }

    if let Some(stats) = wallet_stats {
        if stats.is_proven {
            applied.push(Boost {
                amount: 0.15,
                evidence: format!(
                    "proven whale ({} trades, ${} total)",
                    stats.trade_count,
                    stats.total_usd.round()
                ),
            });
        } else if stats.is_active(now) {
            applied.push(Boost {
                amount: 0.08,
                evidence: format!("active wallet ({} recent trades)", stats.trade_count),
            });
        }
    }

    let hour = tx.raw.block_time.hour();
    if (PEAK_START_HOUR..=PEAK_END_HOUR).contains(&hour) {
        applied.push(Boost {
            amount: 0.04,
            evidence: format!("peak trading hours ({hour:02}:00 UTC)"),
        });
    }

    applied
}

/// Sum of the applied boosts.
pub fn total(applied: &[Boost]) -> f64 {
    applied.iter().map(|boost| boost.amount).sum()
}
