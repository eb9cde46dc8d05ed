//! P5: mega-whale signal
//!
//! Opt-in hint from the analytical backend: wallets with a history of
//! very large classified volume add a small vote in whatever direction
//! is already leading. Never creates a direction by itself.

use crate::phase::{PhaseOutcome, Vote};
use types::ClassificationKind;

/// Phase-local confidence of the pro-direction hint.
const HINT_CONFIDENCE: f64 = 0.50;

pub fn evaluate(is_mega_whale: bool, leading: Option<ClassificationKind>) -> PhaseOutcome {
    if !is_mega_whale {
        return PhaseOutcome::Abstain;
    }
    let Some(leading) = leading else {
        return PhaseOutcome::Abstain;
    };
    if !leading.is_directional() {
        return PhaseOutcome::Abstain;
    }

    let direction = if leading.is_buy_side() {
        ClassificationKind::Buy
    } else {
        ClassificationKind::Sell
    };
    PhaseOutcome::Vote(
        Vote::new(direction, HINT_CONFIDENCE)
            .with_evidence("historical mega-whale wallet")
            .with_tag("mega_whale"),
    )
}
