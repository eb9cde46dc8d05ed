//! Address labels and entity kinds

use crate::chain::Chain;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of entity an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelKind {
    Cex,
    Dex,
    Bridge,
    Lending,
    Staking,
    Yield,
    Mev,
    Mixer,
    Whale,
    Eoa,
    Unknown,
}

impl LabelKind {
    /// Kinds eligible for the whale role in the perspective transform.
    /// Exchange and protocol contracts are never "the whale".
    pub fn is_wallet(&self) -> bool {
        matches!(self, LabelKind::Eoa | LabelKind::Unknown | LabelKind::Whale)
    }

    pub fn is_cex(&self) -> bool {
        matches!(self, LabelKind::Cex)
    }

    pub fn is_dex(&self) -> bool {
        matches!(self, LabelKind::Dex)
    }

    /// Protocol contracts the classifier treats as DeFi interactions.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            LabelKind::Dex
                | LabelKind::Bridge
                | LabelKind::Lending
                | LabelKind::Staking
                | LabelKind::Yield
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Cex => "CEX",
            LabelKind::Dex => "DEX",
            LabelKind::Bridge => "BRIDGE",
            LabelKind::Lending => "LENDING",
            LabelKind::Staking => "STAKING",
            LabelKind::Yield => "YIELD",
            LabelKind::Mev => "MEV",
            LabelKind::Mixer => "MIXER",
            LabelKind::Whale => "WHALE",
            LabelKind::Eoa => "EOA",
            LabelKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelKind {
    type Err = crate::chain::UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CEX" => Ok(LabelKind::Cex),
            "DEX" => Ok(LabelKind::Dex),
            "BRIDGE" => Ok(LabelKind::Bridge),
            "LENDING" => Ok(LabelKind::Lending),
            "STAKING" => Ok(LabelKind::Staking),
            "YIELD" => Ok(LabelKind::Yield),
            "MEV" => Ok(LabelKind::Mev),
            "MIXER" => Ok(LabelKind::Mixer),
            "WHALE" => Ok(LabelKind::Whale),
            "EOA" => Ok(LabelKind::Eoa),
            "UNKNOWN" => Ok(LabelKind::Unknown),
            other => Err(crate::chain::UnknownChain(other.to_string())),
        }
    }
}

/// A resolved label for one address on one chain.
///
/// Labels come from the embedded registry, the label store, or a remote
/// explorer lookup. The provider enforces TTLs; the struct only records
/// when the label was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressLabel {
    pub address: String,
    pub chain: Chain,
    pub kind: LabelKind,
    pub entity_name: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

impl AddressLabel {
    pub fn new(
        address: impl Into<String>,
        chain: Chain,
        kind: LabelKind,
        entity_name: Option<String>,
        confidence: f64,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            address: address.into().to_lowercase(),
            chain,
            kind,
            entity_name,
            confidence: confidence.clamp(0.0, 1.0),
            updated_at,
        }
    }

    /// The fallback label when every lookup tier failed.
    pub fn unknown(address: impl Into<String>, chain: Chain, now: DateTime<Utc>) -> Self {
        Self::new(address, chain, LabelKind::Unknown, None, 0.0, now)
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.updated_at > ttl
    }

    /// Pick the better of two labels for the same address: higher
    /// confidence wins, ties broken by freshness.
    pub fn prefer(self, other: AddressLabel) -> AddressLabel {
        if (other.confidence - self.confidence).abs() < f64::EPSILON {
            if other.updated_at > self.updated_at {
                other
            } else {
                self
            }
        } else if other.confidence > self.confidence {
            other
        } else {
            self
        }
    }

    /// True when both labels name the same entity (case-insensitive).
    pub fn same_entity(&self, other: &AddressLabel) -> bool {
        match (&self.entity_name, &other.entity_name) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}
