//! Token price resolution
//!
//! Stablecoins resolve to 1.0 from a built-in table. Everything else
//! uses the last observed price, applied only within the staleness
//! budget; past that the resolver answers `None` and the event proceeds
//! with a zero USD value and a `price_missing` tag.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Symbols pinned to $1.
static STABLECOINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["USDC", "USDT", "DAI", "BUSD", "TUSD", "FRAX", "USDP", "GUSD"]
        .into_iter()
        .collect()
});

pub fn is_stablecoin(symbol: &str) -> bool {
    STABLECOINS.contains(symbol.to_uppercase().as_str())
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    price: Decimal,
    observed_at: DateTime<Utc>,
}

/// Last-observation price cache with a staleness budget.
pub struct PriceResolver {
    staleness: Duration,
    observations: DashMap<String, Observation>,
}

impl PriceResolver {
    pub fn new(staleness: Duration) -> Self {
        Self {
            staleness,
            observations: DashMap::new(),
        }
    }

    /// Record a price observation from any feed.
    pub fn observe(&self, symbol: &str, price: Decimal, observed_at: DateTime<Utc>) {
        if price < Decimal::ZERO {
            debug!(symbol, %price, "ignoring negative price observation");
            return;
        }
        let key = symbol.to_uppercase();
        self.observations
            .entry(key)
            .and_modify(|existing| {
                if observed_at >= existing.observed_at {
                    *existing = Observation { price, observed_at };
                }
            })
            .or_insert(Observation { price, observed_at });
    }

    /// USD per unit at `at`, or `None` when nothing fresh is known.
    pub fn price(&self, symbol: &str, at: DateTime<Utc>) -> Option<Decimal> {
        let key = symbol.to_uppercase();
        if STABLECOINS.contains(key.as_str()) {
            return Some(Decimal::ONE);
        }

        let observation = *self.observations.get(&key)?;
        let budget = ChronoDuration::from_std(self.staleness)
            .unwrap_or_else(|_| ChronoDuration::seconds(120));
        let age = at - observation.observed_at;
        if age > budget || age < -budget {
            return None;
        }
        Some(observation.price)
    }

    /// Value `amount` of `symbol` at `at`, or `None` without a fresh
    /// price.
    pub fn usd_value(&self, symbol: &str, amount: Decimal, at: DateTime<Utc>) -> Option<Decimal> {
        Some((self.price(symbol, at)? * amount).max(Decimal::ZERO))
    }
}

impl Default for PriceResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(
            config::service::enrichment::PRICE_STALENESS_SECS,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_stablecoins_always_one() {
        let resolver = PriceResolver::default();
        assert_eq!(resolver.price("usdc", at(0)), Some(Decimal::ONE));
        assert_eq!(resolver.price("USDT", at(0)), Some(Decimal::ONE));
    }

    #[test]
    fn test_staleness_budget() {
        let resolver = PriceResolver::new(Duration::from_secs(120));
        resolver.observe("ETH", dec!(3000), at(1000));

        assert_eq!(resolver.price("ETH", at(1100)), Some(dec!(3000)));
        assert_eq!(resolver.price("ETH", at(1120)), Some(dec!(3000)));
        assert_eq!(resolver.price("ETH", at(1121)), None);
    }

    #[test]
    fn test_unknown_symbol_is_none() {
        let resolver = PriceResolver::default();
        assert_eq!(resolver.price("PEPE", at(0)), None);
    }

    #[test]
    fn test_older_observation_does_not_regress() {
        let resolver = PriceResolver::new(Duration::from_secs(120));
        resolver.observe("ETH", dec!(3000), at(100));
        resolver.observe("ETH", dec!(2900), at(50));
        assert_eq!(resolver.price("ETH", at(100)), Some(dec!(3000)));
    }

    #[test]
    fn test_usd_value() {
        let resolver = PriceResolver::new(Duration::from_secs(120));
        resolver.observe("ETH", dec!(3000), at(0));
        assert_eq!(resolver.usd_value("ETH", dec!(10), at(0)), Some(dec!(30_000)));
        assert_eq!(resolver.usd_value("PEPE", dec!(10), at(0)), None);
    }
}
