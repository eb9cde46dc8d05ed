//! P2: DEX and protocol intent analysis
//!
//! Token flow toward a router proves nothing by itself; direction is
//! only asserted from decoded swap facts or a recognized intent method.
//! Liquidity management, bridging and staking classify as their own
//! kinds rather than trades. The legacy flow-direction guess survives
//! behind `dex_coverage_mode` for operators who accept its error rate.

use crate::facts::{IntentMethod, SwapFacts};
use crate::phase::{PhaseOutcome, Vote};
use config::ClassifierConfig;
use types::{ClassificationKind, EnrichedTransfer, LabelKind};

/// Confidence for fully decoded swap directions.
const DECODED_SWAP_CONFIDENCE: f64 = 0.85;
/// Confidence for intent methods recognized without full decoding.
const INTENT_CONFIDENCE: f64 = 0.80;
/// Confidence for the coverage-mode guess.
const COVERAGE_CONFIDENCE: f64 = 0.65;

pub fn evaluate(
    tx: &EnrichedTransfer,
    facts: Option<&SwapFacts>,
    config: &ClassifierConfig,
) -> PhaseOutcome {
    let from_kind = tx.from_label.as_ref().map(|l| l.kind);
    let to_kind = tx.to_label.as_ref().map(|l| l.kind);

    let touches_protocol = from_kind.map(|k| k.is_protocol()).unwrap_or(false)
        || to_kind.map(|k| k.is_protocol()).unwrap_or(false);
    if !touches_protocol {
        return PhaseOutcome::Abstain;
    }

    // Failed transactions never classify
    if let Some(facts) = facts {
        if !facts.success {
            return PhaseOutcome::Abstain;
        }
    }

    // Decoded intent methods take precedence over label shape
    if let Some(facts) = facts {
        if let Some(outcome) = intent_outcome(facts, config) {
            return outcome;
        }
        if facts.has_decoded_swap() {
            return swap_outcome(facts);
        }
    }

    // No decoded facts: fall back to what the labels alone support
    label_outcome(tx, from_kind, to_kind, config)
}

fn intent_outcome(facts: &SwapFacts, config: &ClassifierConfig) -> Option<PhaseOutcome> {
    let outcome = match facts.method? {
        IntentMethod::AddLiquidity => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Liquidity, INTENT_CONFIDENCE)
                .with_evidence("addLiquidity decoded")
                .with_tag("liquidity_add"),
        ),
        IntentMethod::RemoveLiquidity => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Liquidity, INTENT_CONFIDENCE)
                .with_evidence("removeLiquidity decoded")
                .with_tag("liquidity_remove"),
        ),
        IntentMethod::Stake => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Staking, INTENT_CONFIDENCE)
                .with_evidence("staking deposit decoded"),
        ),
        IntentMethod::Unstake => PhaseOutcome::Vote(
            // Unstaking is sell-side motion but not a sale
            Vote::new(ClassificationKind::Transfer, INTENT_CONFIDENCE)
                .with_evidence("unstaking decoded")
                .with_tag("unstaking"),
        ),
        IntentMethod::BridgeDeposit { to_l2 } => {
            if config.bridge_direction_enabled {
                if to_l2 {
                    PhaseOutcome::Vote(
                        Vote::new(ClassificationKind::Buy, 0.70)
                            .with_evidence("bridge deposit toward L2 (accumulation)")
                            .with_tag("bridge"),
                    )
                } else {
                    PhaseOutcome::Vote(
                        Vote::new(ClassificationKind::Sell, 0.65)
                            .with_evidence("bridge exit toward L1")
                            .with_tag("bridge"),
                    )
                }
            } else {
                PhaseOutcome::Vote(
                    Vote::new(ClassificationKind::Bridge, INTENT_CONFIDENCE)
                        .with_evidence("bridge transit decoded")
                        .with_tag("bridge"),
                )
            }
        }
        IntentMethod::Swap => return None, // handled by swap_outcome
    };
    Some(outcome)
}

/// Direction from decoded swap legs.
pub(crate) fn swap_outcome(facts: &SwapFacts) -> PhaseOutcome {
    let acquired_stable = facts.tokens_in.iter().all(|flow| flow.is_stable());
    let paid_stable = facts.tokens_out.iter().all(|flow| flow.is_stable());
    let inbound = facts
        .tokens_in
        .first()
        .map(|flow| flow.symbol.clone())
        .unwrap_or_default();
    let outbound = facts
        .tokens_out
        .first()
        .map(|flow| flow.symbol.clone())
        .unwrap_or_default();

    match (paid_stable, acquired_stable) {
        (true, false) => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Buy, DECODED_SWAP_CONFIDENCE)
                .with_evidence(format!("swap decoded: {outbound} -> {inbound} (stable out)")),
        ),
        (false, true) => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Sell, DECODED_SWAP_CONFIDENCE)
                .with_evidence(format!("swap decoded: {outbound} -> {inbound} (stable in)")),
        ),
        _ => {
            // Crypto-to-crypto: a low-cap token bought with a major
            // still reads as accumulation
            let inbound_low_cap = facts
                .tokens_in
                .iter()
                .all(|flow| !flow.is_major() && !flow.is_stable());
            let outbound_major = facts.tokens_out.iter().any(|flow| flow.is_major());
            if inbound_low_cap && outbound_major {
                PhaseOutcome::Vote(
                    Vote::new(ClassificationKind::Buy, 0.70)
                        .with_evidence(format!("swap decoded: major {outbound} into {inbound}"))
                        .with_tag("low_cap_accumulation"),
                )
            } else {
                PhaseOutcome::Vote(
                    Vote::new(ClassificationKind::Defi, 0.70)
                        .with_evidence(format!("crypto-to-crypto swap {outbound} -> {inbound}")),
                )
            }
        }
    }
}

fn label_outcome(
    tx: &EnrichedTransfer,
    from_kind: Option<LabelKind>,
    to_kind: Option<LabelKind>,
    config: &ClassifierConfig,
) -> PhaseOutcome {
    match (from_kind, to_kind) {
        // Staking contracts classify from label shape alone
        (_, Some(LabelKind::Staking)) => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Staking, INTENT_CONFIDENCE)
                .with_evidence("transfer into staking protocol"),
        ),
        (Some(LabelKind::Staking), _) => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Transfer, COVERAGE_CONFIDENCE)
                .with_evidence("withdrawal from staking protocol")
                .with_tag("unstaking"),
        ),
        (_, Some(LabelKind::Bridge)) | (Some(LabelKind::Bridge), _) => {
            bridge_label_outcome(tx, from_kind, config)
        }
        (_, Some(LabelKind::Lending | LabelKind::Yield))
        | (Some(LabelKind::Lending | LabelKind::Yield), _) => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Defi, 0.70)
                .with_evidence("lending or yield protocol interaction"),
        ),
        (_, Some(LabelKind::Dex)) if config.dex_coverage_mode => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Sell, COVERAGE_CONFIDENCE)
                .with_evidence("coverage mode: token flow toward router")
                .with_tag("coverage_mode"),
        ),
        (Some(LabelKind::Dex), _) if config.dex_coverage_mode => PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Buy, COVERAGE_CONFIDENCE)
                .with_evidence("coverage mode: token flow from router")
                .with_tag("coverage_mode"),
        ),
        // Router edge without decoded facts proves nothing
        _ => PhaseOutcome::Abstain,
    }
}

fn bridge_label_outcome(
    tx: &EnrichedTransfer,
    from_kind: Option<LabelKind>,
    config: &ClassifierConfig,
) -> PhaseOutcome {
    let exiting = matches!(from_kind, Some(LabelKind::Bridge));
    if config.bridge_direction_enabled {
        // On an L1 chain, wallet-to-bridge funds an L2 position
        let to_l2 = !tx.raw.chain.is_l2() && !exiting;
        if to_l2 {
            PhaseOutcome::Vote(
                Vote::new(ClassificationKind::Buy, 0.70)
                    .with_evidence("bridge deposit toward L2 (accumulation)")
                    .with_tag("bridge"),
            )
        } else {
            PhaseOutcome::Vote(
                Vote::new(ClassificationKind::Sell, 0.65)
                    .with_evidence("bridge exit toward L1")
                    .with_tag("bridge"),
            )
        }
    } else {
        PhaseOutcome::Vote(
            Vote::new(ClassificationKind::Bridge, 0.75)
                .with_evidence("bridge interaction")
                .with_tag("bridge"),
        )
    }
}
