//! Classification kinds and the classifier's output

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Final verdict for one transfer, from the whale's perspective.
///
/// `ModerateBuy`/`ModerateSell` are reserved for final confidence in
/// `[0.60, 0.80)`; the strong directional kinds require `>= 0.80`.
/// Protocol kinds (`Staking`, `Defi`, `Bridge`, `Liquidity`) keep their
/// identity regardless of confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationKind {
    Buy,
    Sell,
    Transfer,
    ModerateBuy,
    ModerateSell,
    Staking,
    Defi,
    Bridge,
    Liquidity,
    Unknown,
}

impl ClassificationKind {
    pub fn is_buy_side(&self) -> bool {
        matches!(self, ClassificationKind::Buy | ClassificationKind::ModerateBuy)
    }

    pub fn is_sell_side(&self) -> bool {
        matches!(self, ClassificationKind::Sell | ClassificationKind::ModerateSell)
    }

    pub fn is_directional(&self) -> bool {
        self.is_buy_side() || self.is_sell_side()
    }

    /// Kinds that describe protocol interactions rather than trades.
    /// These are exempt from near-duplicate suppression.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            ClassificationKind::Defi
                | ClassificationKind::Liquidity
                | ClassificationKind::Bridge
                | ClassificationKind::Staking
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationKind::Buy => "BUY",
            ClassificationKind::Sell => "SELL",
            ClassificationKind::Transfer => "TRANSFER",
            ClassificationKind::ModerateBuy => "MODERATE_BUY",
            ClassificationKind::ModerateSell => "MODERATE_SELL",
            ClassificationKind::Staking => "STAKING",
            ClassificationKind::Defi => "DEFI",
            ClassificationKind::Bridge => "BRIDGE",
            ClassificationKind::Liquidity => "LIQUIDITY",
            ClassificationKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ClassificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregated classifier output for one transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ClassificationKind,
    /// Final stacked confidence in `[0, 1]`.
    pub confidence: f64,
    /// Ordered human-readable evidence lines, earliest phase first.
    pub evidence: Vec<String>,
    pub tags: BTreeSet<String>,
    /// Cleared for scam tokens and thin-liquidity events without
    /// changing the kind.
    pub should_alert: bool,
}

impl Classification {
    pub fn new(kind: ClassificationKind, confidence: f64) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
            tags: BTreeSet::new(),
            should_alert: true,
        }
    }

    pub fn unknown() -> Self {
        Self::new(ClassificationKind::Unknown, 0.0)
    }

    pub fn with_evidence(mut self, line: impl Into<String>) -> Self {
        self.evidence.push(line.into());
        self
    }

    pub fn push_evidence(&mut self, line: impl Into<String>) {
        self.evidence.push(line.into());
    }

    pub fn tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Evidence joined for the newline-delimited storage column.
    pub fn evidence_text(&self) -> String {
        self.evidence.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(Classification::new(ClassificationKind::Buy, 1.4).confidence, 1.0);
        assert_eq!(Classification::new(ClassificationKind::Sell, -0.1).confidence, 0.0);
    }

    #[test]
    fn test_side_helpers() {
        assert!(ClassificationKind::ModerateBuy.is_buy_side());
        assert!(ClassificationKind::Sell.is_sell_side());
        assert!(!ClassificationKind::Staking.is_directional());
        assert!(ClassificationKind::Liquidity.is_protocol());
        assert!(!ClassificationKind::Transfer.is_protocol());
    }

    #[test]
    fn test_evidence_order_preserved() {
        let c = Classification::new(ClassificationKind::Buy, 0.9)
            .with_evidence("first")
            .with_evidence("second");
        assert_eq!(c.evidence_text(), "first\nsecond");
    }
}
