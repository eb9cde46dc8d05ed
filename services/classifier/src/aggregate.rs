//! Master aggregation with confidence stacking
//!
//! Concordant directional votes combine multiplicatively with a small
//! multi-signal bonus:
//!
//! ```text
//! C_dir = 1 − Π (1 − w_p · c_p) · (1 + bonus),   bonus = (n − 1) · 0.08, capped at 0.32
//! ```
//!
//! The stack is computed incrementally and kept monotone: a concordant
//! vote can only raise (never lower) a direction's running confidence,
//! so weak late signals cannot erase strong early ones.

use crate::phase::{PhaseOutcome, PhaseReport, Vote};
use config::ClassifierConfig;
use types::{Classification, ClassificationKind};

const BONUS_PER_VOTE: f64 = config::service::classifier::STACK_BONUS_PER_VOTE;
const BONUS_CAP: f64 = config::service::classifier::STACK_BONUS_CAP;

/// Running multiplicative stack for one direction.
#[derive(Debug, Clone)]
pub struct DirectionStack {
    product: f64,
    votes: u32,
    confidence: f64,
}

impl DirectionStack {
    pub fn new() -> Self {
        Self {
            product: 1.0,
            votes: 0,
            confidence: 0.0,
        }
    }

    /// Fold one weighted vote into the stack.
    pub fn push(&mut self, weight: f64, confidence: f64) {
        self.product *= 1.0 - (weight * confidence).clamp(0.0, 1.0);
        self.votes += 1;
        let bonus = (BONUS_PER_VOTE * (self.votes.saturating_sub(1)) as f64).min(BONUS_CAP);
        let stacked = 1.0 - self.product * (1.0 + bonus);
        // Monotone envelope: concordant evidence never lowers confidence
        self.confidence = self.confidence.max(stacked).clamp(0.0, 1.0);
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn votes(&self) -> u32 {
        self.votes
    }
}

impl Default for DirectionStack {
    fn default() -> Self {
        Self::new()
    }
}

/// The aggregate before behavioral boosts.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub kind: ClassificationKind,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub tags: std::collections::BTreeSet<String>,
}

/// Combines phase reports into a single pre-boost verdict.
pub struct Aggregator {
    config: ClassifierConfig,
}

impl Aggregator {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Running directional confidence across the reports seen so far,
    /// used by the engine's early-exit check and P5's leading hint.
    pub fn leading(&self, reports: &[PhaseReport]) -> Option<(ClassificationKind, f64)> {
        let (buy, sell) = stacks(reports);
        if buy.votes() == 0 && sell.votes() == 0 {
            return None;
        }
        if buy.confidence() >= sell.confidence() {
            Some((ClassificationKind::Buy, buy.confidence()))
        } else {
            Some((ClassificationKind::Sell, sell.confidence()))
        }
    }

    /// Final aggregation over all phase reports.
    pub fn aggregate(&self, reports: &[PhaseReport]) -> Aggregate {
        let (buy, sell) = stacks(reports);

        // Best non-directional protocol vote, if any
        let protocol = reports
            .iter()
            .filter_map(|report| report.outcome.vote().map(|vote| (report, vote)))
            .filter(|(_, vote)| vote.kind.is_protocol())
            .max_by(|(_, a), (_, b)| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        // Best explicit TRANSFER vote (inter-exchange moves and the
        // like) carries its confidence when nothing else does
        let transfer = reports
            .iter()
            .filter_map(|report| report.outcome.vote())
            .filter(|vote| vote.kind == ClassificationKind::Transfer)
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        let directional = self.resolve_direction(reports, &buy, &sell);

        let (kind, confidence) = match (directional, protocol) {
            (Some((kind, confidence)), Some((_, vote))) => {
                // A decoded protocol interaction outranks a weak
                // directional stack
                if confidence < self.config.medium && vote.confidence >= confidence {
                    (vote.kind, vote.confidence)
                } else {
                    (kind, confidence)
                }
            }
            (Some((kind, confidence)), None) => (kind, confidence),
            (None, Some((_, vote))) => (vote.kind, vote.confidence),
            (None, None) => match transfer {
                Some(vote) => (ClassificationKind::Transfer, vote.confidence),
                None => (ClassificationKind::Transfer, 0.0),
            },
        };

        let mut evidence = Vec::new();
        let mut tags = std::collections::BTreeSet::new();
        for report in reports {
            if let Some(vote) = report.outcome.vote() {
                evidence.extend(vote.evidence.iter().cloned());
                tags.extend(vote.tags.iter().cloned());
            }
        }

        Aggregate {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
            tags,
        }
    }

    fn resolve_direction(
        &self,
        reports: &[PhaseReport],
        buy: &DirectionStack,
        sell: &DirectionStack,
    ) -> Option<(ClassificationKind, f64)> {
        if buy.votes() == 0 && sell.votes() == 0 {
            return None;
        }
        if buy.votes() > 0 && sell.votes() > 0 {
            let diff = (buy.confidence() - sell.confidence()).abs();
            if diff <= 0.10 {
                // Comparable but conflicting: prefer receipt evidence,
                // fall back to TRANSFER
                if let Some(receipt_vote) = reports
                    .iter()
                    .filter(|report| report.phase == "chain")
                    .filter_map(|report| report.outcome.vote())
                    .find(|vote| vote.kind.is_directional())
                {
                    let stack = if receipt_vote.kind.is_buy_side() {
                        buy
                    } else {
                        sell
                    };
                    return Some((receipt_vote.kind, stack.confidence()));
                }
                return Some((ClassificationKind::Transfer, buy.confidence().min(sell.confidence())));
            }
        }
        if buy.confidence() >= sell.confidence() {
            Some((ClassificationKind::Buy, buy.confidence()))
        } else {
            Some((ClassificationKind::Sell, sell.confidence()))
        }
    }

    /// Bucket a directional result by the configured thresholds.
    pub fn bucket(&self, kind: ClassificationKind, confidence: f64) -> ClassificationKind {
        if !kind.is_directional() {
            return kind;
        }
        let buy_side = kind.is_buy_side();
        if confidence >= self.config.high {
            if buy_side {
                ClassificationKind::Buy
            } else {
                ClassificationKind::Sell
            }
        } else if confidence >= self.config.medium {
            if buy_side {
                ClassificationKind::ModerateBuy
            } else {
                ClassificationKind::ModerateSell
            }
        } else {
            ClassificationKind::Transfer
        }
    }

    /// Apply alerting policy without changing the kind.
    pub fn finalize(&self, mut classification: Classification) -> Classification {
        if classification.has_tag("scam_token") || classification.has_tag("thin_liquidity") {
            classification.should_alert = false;
        }
        classification
    }
}

/// Directional stacks over a report slice. TRANSFER votes count toward
/// neither direction.
fn stacks(reports: &[PhaseReport]) -> (DirectionStack, DirectionStack) {
    let mut buy = DirectionStack::new();
    let mut sell = DirectionStack::new();
    for report in reports {
        if let PhaseOutcome::Vote(Vote {
            kind, confidence, ..
        }) = &report.outcome
        {
            if kind.is_buy_side() {
                buy.push(report.weight, *confidence);
            } else if kind.is_sell_side() {
                sell.push(report.weight, *confidence);
            }
        }
    }
    (buy, sell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Vote;

    fn report(phase: &'static str, weight: f64, kind: ClassificationKind, c: f64) -> PhaseReport {
        PhaseReport::new(phase, weight, PhaseOutcome::Vote(Vote::new(kind, c)))
    }

    #[test]
    fn test_two_concordant_sell_votes_match_reference() {
        // (w=0.65, c=0.50) and (w=0.60, c=0.45):
        // 1 − (1 − 0.325)(1 − 0.27) · 1.08 ≈ 0.468
        let mut stack = DirectionStack::new();
        stack.push(0.65, 0.50);
        stack.push(0.60, 0.45);
        assert!((stack.confidence() - 0.4678).abs() < 0.001);
    }

    #[test]
    fn test_single_vote_has_no_bonus() {
        let mut stack = DirectionStack::new();
        stack.push(0.65, 0.50);
        assert!((stack.confidence() - 0.325).abs() < 1e-9);
    }

    #[test]
    fn test_concordant_vote_never_decreases() {
        let mut stack = DirectionStack::new();
        stack.push(0.65, 0.90);
        let before = stack.confidence();
        // A nearly worthless concordant vote must not hurt
        stack.push(0.35, 0.01);
        assert!(stack.confidence() >= before);
    }

    #[test]
    fn test_bonus_capped() {
        let mut stack = DirectionStack::new();
        for _ in 0..10 {
            stack.push(0.5, 0.2);
        }
        assert!(stack.confidence() <= 1.0);
    }

    #[test]
    fn test_aggregate_below_medium_is_transfer_after_bucket() {
        let aggregator = Aggregator::new(ClassifierConfig::default());
        let reports = vec![
            report("cex", 0.65, ClassificationKind::Sell, 0.50),
            report("dex", 0.60, ClassificationKind::Sell, 0.45),
        ];
        let aggregate = aggregator.aggregate(&reports);
        assert!((aggregate.confidence - 0.4678).abs() < 0.001);
        assert_eq!(
            aggregator.bucket(aggregate.kind, aggregate.confidence),
            ClassificationKind::Transfer
        );
        // With the USD boost applied the same result turns moderate
        let boosted = aggregate.confidence + 0.15;
        assert_eq!(
            aggregator.bucket(aggregate.kind, boosted),
            ClassificationKind::ModerateSell
        );
    }

    #[test]
    fn test_conflict_prefers_receipt_direction() {
        let aggregator = Aggregator::new(ClassifierConfig::default());
        let reports = vec![
            report("cex", 0.65, ClassificationKind::Sell, 0.55),
            report("dex", 0.60, ClassificationKind::Buy, 0.55),
            report("chain", 0.50, ClassificationKind::Buy, 0.60),
        ];
        let aggregate = aggregator.aggregate(&reports);
        assert!(aggregate.kind.is_buy_side());
    }

    #[test]
    fn test_conflict_without_receipt_falls_back_to_transfer() {
        let aggregator = Aggregator::new(ClassifierConfig::default());
        let reports = vec![
            report("cex", 0.65, ClassificationKind::Sell, 0.55),
            report("dex", 0.60, ClassificationKind::Buy, 0.58),
        ];
        let aggregate = aggregator.aggregate(&reports);
        assert_eq!(aggregate.kind, ClassificationKind::Transfer);
    }

    #[test]
    fn test_protocol_kind_survives_weak_direction() {
        let aggregator = Aggregator::new(ClassifierConfig::default());
        let reports = vec![
            report("dex", 0.60, ClassificationKind::Staking, 0.80),
            report("behavior", 0.45, ClassificationKind::Buy, 0.20),
        ];
        let aggregate = aggregator.aggregate(&reports);
        assert_eq!(aggregate.kind, ClassificationKind::Staking);
        assert_eq!(
            aggregator.bucket(aggregate.kind, aggregate.confidence),
            ClassificationKind::Staking
        );
    }

    #[test]
    fn test_alert_policy_does_not_change_kind() {
        let aggregator = Aggregator::new(ClassifierConfig::default());
        let mut classification = Classification::new(ClassificationKind::Buy, 0.9);
        classification.tag("scam_token");
        let finalized = aggregator.finalize(classification);
        assert_eq!(finalized.kind, ClassificationKind::Buy);
        assert!(!finalized.should_alert);
    }
}
