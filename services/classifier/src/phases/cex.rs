//! P1: centralized-exchange flow analysis
//!
//! The highest-signal phase: funds moving between an exchange hot
//! wallet and a plain wallet are a withdrawal (BUY) or a deposit
//! (SELL). Moves between two exchanges are either an internal shuffle
//! (same entity, dropped entirely) or an inter-exchange transfer.

use crate::phase::{PhaseOutcome, Vote};
use types::{AddressLabel, ClassificationKind, EnrichedTransfer, LabelKind};

/// Base confidence for a clean CEX edge.
const BASE_CONFIDENCE: f64 = 0.90;

fn entity_or(label: &AddressLabel, fallback: &str) -> String {
    label
        .entity_name
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

pub fn evaluate(tx: &EnrichedTransfer) -> PhaseOutcome {
    let (Some(from_label), Some(to_label)) = (&tx.from_label, &tx.to_label) else {
        return PhaseOutcome::Abstain;
    };

    match (from_label.kind, to_label.kind) {
        (LabelKind::Cex, LabelKind::Cex) => {
            if from_label.same_entity(to_label) {
                // Internal rebalancing, not whale activity
                PhaseOutcome::Skip
            } else {
                PhaseOutcome::Vote(
                    Vote::new(ClassificationKind::Transfer, BASE_CONFIDENCE)
                        .with_evidence(format!(
                            "inter-exchange transfer {} -> {}",
                            entity_or(from_label, "unknown CEX"),
                            entity_or(to_label, "unknown CEX"),
                        ))
                        .with_tag("inter_exchange"),
                )
            }
        }
        (LabelKind::Cex, to_kind) if to_kind.is_wallet() => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Buy, BASE_CONFIDENCE).with_evidence(format!(
                "CEX withdrawal from {}",
                entity_or(from_label, "unknown CEX")
            )),
        ),
        (from_kind, LabelKind::Cex) if from_kind.is_wallet() => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Sell, BASE_CONFIDENCE).with_evidence(format!(
                "CEX deposit to {}",
                entity_or(to_label, "unknown CEX")
            )),
        ),
        _ => PhaseOutcome::Abstain,
    }
}
