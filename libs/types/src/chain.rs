//! Supported blockchain identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Chains whaletrack ingests from.
///
/// The wire form is lowercase (`"ethereum"`, `"polygon"`, ...), matching
/// what explorer APIs and alert feeds emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Polygon,
    Arbitrum,
    Base,
    Solana,
    Bitcoin,
    Xrp,
}

impl Chain {
    /// Chains where gas price carries urgency information.
    pub fn is_evm(&self) -> bool {
        matches!(
            self,
            Chain::Ethereum | Chain::Polygon | Chain::Arbitrum | Chain::Base
        )
    }

    /// Layer-2 rollups settling on Ethereum. Used by the bridge
    /// direction heuristic.
    pub fn is_l2(&self) -> bool {
        matches!(self, Chain::Arbitrum | Chain::Base | Chain::Polygon)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Arbitrum => "arbitrum",
            Chain::Base => "base",
            Chain::Solana => "solana",
            Chain::Bitcoin => "bitcoin",
            Chain::Xrp => "xrp",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a chain string is not recognized.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown chain: {0}")]
pub struct UnknownChain(pub String);

impl FromStr for Chain {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "arbitrum" => Ok(Chain::Arbitrum),
            "base" => Ok(Chain::Base),
            "solana" | "sol" => Ok(Chain::Solana),
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            "xrp" | "ripple" => Ok(Chain::Xrp),
            other => Err(UnknownChain(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_wire_form() {
        for chain in [
            Chain::Ethereum,
            Chain::Polygon,
            Chain::Arbitrum,
            Chain::Base,
            Chain::Solana,
            Chain::Bitcoin,
            Chain::Xrp,
        ] {
            assert_eq!(chain.as_str().parse::<Chain>(), Ok(chain));
        }
    }

    #[test]
    fn test_aliases_and_case() {
        assert_eq!("ETH".parse::<Chain>(), Ok(Chain::Ethereum));
        assert_eq!("Matic".parse::<Chain>(), Ok(Chain::Polygon));
        assert!("dogecoin".parse::<Chain>().is_err());
    }

    #[test]
    fn test_evm_split() {
        assert!(Chain::Ethereum.is_evm());
        assert!(Chain::Polygon.is_evm());
        assert!(!Chain::Bitcoin.is_evm());
        assert!(!Chain::Solana.is_evm());
    }
}
