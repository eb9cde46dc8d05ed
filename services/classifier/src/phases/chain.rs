//! P3: blockchain-specific receipt analysis
//!
//! Votes purely from what the transaction receipt proves: decoded swap
//! legs and their direction. Abstains whenever the receipt is missing
//! or the transaction failed. The fact extraction itself happens once
//! in the engine and is shared with P2 through the context, so this
//! phase stays idempotent and safe to re-run.

use crate::facts::SwapFacts;
use crate::phase::PhaseOutcome;
use crate::phases::dex::swap_outcome;

pub fn evaluate(facts: Option<&SwapFacts>) -> PhaseOutcome {
    let Some(facts) = facts else {
        return PhaseOutcome::Abstain;
    };
    if !facts.success || !facts.has_decoded_swap() {
        return PhaseOutcome::Abstain;
    }

    // Same direction logic as the protocol phase, but grounded in the
    // receipt rather than the router label
    match swap_outcome(facts) {
        PhaseOutcome::Vote(vote) => {
            let confidence = (vote.confidence - 0.05).max(0.0);
            let mut vote = vote;
            vote.confidence = confidence;
            vote.evidence = vote
                .evidence
                .into_iter()
                .map(|line| format!("receipt: {line}"))
                .collect();
            PhaseOutcome::Vote(vote)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{IntentMethod, TokenFlow};
    use rust_decimal_macros::dec;
    use types::ClassificationKind;

    fn swap(tokens_out: &str, tokens_in: &str) -> SwapFacts {
        SwapFacts {
            success: true,
            tokens_in: vec![TokenFlow::new(tokens_in, dec!(1))],
            tokens_out: vec![TokenFlow::new(tokens_out, dec!(1))],
            method: Some(IntentMethod::Swap),
        }
    }

    #[test]
    fn test_missing_receipt_abstains() {
        assert_eq!(evaluate(None), PhaseOutcome::Abstain);
    }

    #[test]
    fn test_failed_tx_abstains() {
        assert_eq!(evaluate(Some(&SwapFacts::failed())), PhaseOutcome::Abstain);
    }

    #[test]
    fn test_decoded_swap_votes_with_receipt_prefix() {
        let outcome = evaluate(Some(&swap("USDC", "ETH")));
        let vote = outcome.vote().unwrap();
        assert_eq!(vote.kind, ClassificationKind::Buy);
        assert_eq!(vote.confidence, 0.80);
        assert!(vote.evidence[0].starts_with("receipt: "));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let facts = swap("ETH", "USDC");
        assert_eq!(evaluate(Some(&facts)), evaluate(Some(&facts)));
    }
}
