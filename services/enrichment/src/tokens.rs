//! Token metadata directory
//!
//! Resolves token contract addresses to symbol and decimals. A static
//! table covers the majors; everything else is learned at runtime from
//! sources that carry full token metadata (the explorer poller does,
//! raw log streams do not) and served back within a TTL.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::time::Duration;
use types::Chain;

/// Well-known mainnet token contracts.
const BUILTIN_TOKENS: &[(&str, &str, u8)] = &[
    ("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USDC", 6),
    ("0xdac17f958d2ee523a2206206994597c13d831ec7", "USDT", 6),
    ("0x6b175474e89094c44da98b954eedeac495271d0f", "DAI", 18),
    ("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "WETH", 18),
    ("0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", "WBTC", 8),
    ("0x514910771af9ca656af840dff83e8264ecf986ca", "LINK", 18),
    ("0x7d1afa7b718fb893db30a3abc0cfc608aacfebb0", "MATIC", 18),
];

/// Static lookup for the majors, independent of chain.
pub fn builtin_token(address: &str) -> Option<(&'static str, u8)> {
    BUILTIN_TOKENS
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(address))
        .map(|(_, symbol, decimals)| (*symbol, *decimals))
}

#[derive(Debug, Clone)]
struct LearnedToken {
    symbol: String,
    decimals: Option<u8>,
    learned_at: DateTime<Utc>,
}

/// Runtime token metadata with a TTL on learned entries.
pub struct TokenDirectory {
    ttl: Duration,
    learned: DashMap<(Chain, String), LearnedToken>,
}

impl TokenDirectory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            learned: DashMap::new(),
        }
    }

    /// Record metadata observed on a fully annotated transfer.
    pub fn learn(
        &self,
        chain: Chain,
        address: &str,
        symbol: &str,
        decimals: Option<u8>,
        at: DateTime<Utc>,
    ) {
        if symbol.trim().is_empty() {
            return;
        }
        self.learned.insert(
            (chain, address.to_lowercase()),
            LearnedToken {
                symbol: symbol.to_string(),
                decimals,
                learned_at: at,
            },
        );
    }

    /// Resolve a token address to `(symbol, decimals)`.
    pub fn resolve(
        &self,
        chain: Chain,
        address: &str,
        at: DateTime<Utc>,
    ) -> Option<(String, Option<u8>)> {
        let address = address.to_lowercase();
        if let Some((symbol, decimals)) = builtin_token(&address) {
            return Some((symbol.to_string(), Some(decimals)));
        }

        let key = (chain, address);
        let entry = self.learned.get(&key)?;
        let ttl =
            ChronoDuration::from_std(self.ttl).unwrap_or_else(|_| ChronoDuration::seconds(1800));
        if at - entry.learned_at > ttl {
            drop(entry);
            self.learned.remove(&key);
            return None;
        }
        Some((entry.symbol.clone(), entry.decimals))
    }
}

impl Default for TokenDirectory {
    fn default() -> Self {
        Self::new(Duration::from_secs(
            config::service::enrichment::TOKEN_TTL_SECS,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_builtin_resolution() {
        let directory = TokenDirectory::default();
        let (symbol, decimals) = directory
            .resolve(
                Chain::Ethereum,
                "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                at(0),
            )
            .unwrap();
        assert_eq!(symbol, "USDC");
        assert_eq!(decimals, Some(6));
    }

    #[test]
    fn test_learned_entry_expires() {
        let directory = TokenDirectory::new(Duration::from_secs(1800));
        directory.learn(Chain::Ethereum, "0xPEPE", "PEPE", Some(18), at(0));

        let resolved = directory.resolve(Chain::Ethereum, "0xpepe", at(1700));
        assert_eq!(resolved, Some(("PEPE".to_string(), Some(18))));

        assert_eq!(directory.resolve(Chain::Ethereum, "0xpepe", at(1801)), None);
    }

    #[test]
    fn test_chain_scoped() {
        let directory = TokenDirectory::new(Duration::from_secs(1800));
        directory.learn(Chain::Polygon, "0xabc", "WPOL", Some(18), at(0));
        assert_eq!(directory.resolve(Chain::Ethereum, "0xabc", at(0)), None);
    }
}
