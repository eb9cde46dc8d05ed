//! Phase orchestration
//!
//! Runs the ordered phases with per-phase early exits and a hard time
//! budget, aggregates the surviving votes, layers behavioral boosts on
//! top and buckets the final kind. The engine itself never fails: a
//! phase that errors or times out abstains, and the event keeps moving.

use crate::aggregate::Aggregator;
use crate::facts::{ReceiptFactsProvider, SwapFacts};
use crate::phase::{PhaseOutcome, PhaseReport};
use crate::phases::{behavior, cex, chain, dex, mega_whale, weights};
use chrono::Utc;
use config::ClassifierConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use types::{Classification, ClassificationKind, EnrichedTransfer, WhaleStats};

/// Synchronous wallet history access, backed by the whale registry.
pub trait WalletStatsLookup: Send + Sync {
    fn stats_for(&self, address: &str) -> Option<WhaleStats>;
}

/// Opt-in analytical backend signal.
pub trait AnalyticsBackend: Send + Sync {
    fn is_mega_whale(&self, address: &str) -> bool;
}

/// The engine's verdict for one transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Classified(Classification),
    /// Internal exchange move; drop without storing.
    SkipInternal,
}

/// Multi-phase classification engine.
pub struct ClassificationEngine {
    config: ClassifierConfig,
    aggregator: Aggregator,
    facts_provider: Option<Arc<dyn ReceiptFactsProvider>>,
    stats_lookup: Option<Arc<dyn WalletStatsLookup>>,
    analytics: Option<Arc<dyn AnalyticsBackend>>,
    phase_budget: Duration,
}

impl ClassificationEngine {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            aggregator: Aggregator::new(config.clone()),
            config,
            facts_provider: None,
            stats_lookup: None,
            analytics: None,
            phase_budget: Duration::from_secs(config::service::classifier::PHASE_BUDGET_SECS),
        }
    }

    pub fn with_facts_provider(mut self, provider: Arc<dyn ReceiptFactsProvider>) -> Self {
        self.facts_provider = Some(provider);
        self
    }

    pub fn with_stats_lookup(mut self, lookup: Arc<dyn WalletStatsLookup>) -> Self {
        self.stats_lookup = Some(lookup);
        self
    }

    pub fn with_analytics(mut self, backend: Arc<dyn AnalyticsBackend>) -> Self {
        self.analytics = Some(backend);
        self
    }

    /// Classify one enriched transfer.
    pub async fn classify(&self, tx: &EnrichedTransfer) -> Decision {
        let mut reports: Vec<PhaseReport> = Vec::with_capacity(5);

        // P1: exchange flow
        let cex_outcome = cex::evaluate(tx);
        if cex_outcome == PhaseOutcome::Skip {
            debug!(tx_hash = %tx.raw.tx_hash, "internal exchange move, dropping");
            return Decision::SkipInternal;
        }
        let cex_exit = cex_outcome
            .vote()
            .map(|vote| vote.kind.is_directional() && vote.confidence >= self.config.cex_early_exit)
            .unwrap_or(false);
        reports.push(PhaseReport::new("cex", weights::CEX, cex_outcome));

        if cex_exit {
            // The exchange edge alone is decisive; keep its confidence
            // unweighted and skip the remaining phases
            let vote = reports[0].outcome.vote().cloned();
            if let Some(vote) = vote {
                return Decision::Classified(self.finalize_directional(
                    tx,
                    vote.kind,
                    vote.confidence,
                    vote.evidence,
                    vote.tags,
                ));
            }
        }

        // Receipt facts are fetched once and shared by P2 and P3
        let facts = self.fetch_facts(tx).await;

        // P2: DEX and protocol intent
        let dex_outcome = dex::evaluate(tx, facts.as_ref(), &self.config);
        let dex_exit = dex_outcome
            .vote()
            .map(|vote| vote.confidence >= self.config.dex_early_exit)
            .unwrap_or(false);
        reports.push(PhaseReport::new("dex", weights::DEX, dex_outcome));

        if dex_exit {
            let vote = reports[1].outcome.vote().cloned();
            if let Some(vote) = vote {
                return Decision::Classified(if vote.kind.is_directional() {
                    self.finalize_directional(
                        tx,
                        vote.kind,
                        vote.confidence,
                        vote.evidence,
                        vote.tags,
                    )
                } else {
                    // Protocol kinds keep their identity and skip the
                    // directional boost ladder
                    self.finalize_protocol(tx, vote.kind, vote.confidence, vote.evidence, vote.tags)
                });
            }
        }

        // P3: receipt-grounded direction
        reports.push(PhaseReport::new(
            "chain",
            weights::CHAIN,
            chain::evaluate(facts.as_ref()),
        ));

        // Aggregate early exit before the optional P5
        let leading = self.aggregator.leading(&reports);
        let run_p5 = match leading {
            Some((_, confidence)) => confidence < self.config.early_exit,
            None => true,
        };

        if run_p5 && self.config.mega_whale_enabled {
            if let Some(analytics) = &self.analytics {
                let wallet = candidate_wallet(tx);
                let is_mega = wallet
                    .map(|address| analytics.is_mega_whale(address))
                    .unwrap_or(false);
                reports.push(PhaseReport::new(
                    "mega_whale",
                    self.config.mega_whale_weight,
                    mega_whale::evaluate(is_mega, leading.map(|(kind, _)| kind)),
                ));
            }
        }

        let aggregate = self.aggregator.aggregate(&reports);
        trace!(
            tx_hash = %tx.raw.tx_hash,
            kind = %aggregate.kind,
            confidence = aggregate.confidence,
            "phases aggregated"
        );

        Decision::Classified(if aggregate.kind.is_directional() {
            self.finalize_directional(
                tx,
                aggregate.kind,
                aggregate.confidence,
                aggregate.evidence,
                aggregate.tags,
            )
        } else {
            self.finalize_protocol(
                tx,
                aggregate.kind,
                aggregate.confidence,
                aggregate.evidence,
                aggregate.tags,
            )
        })
    }

    async fn fetch_facts(&self, tx: &EnrichedTransfer) -> Option<SwapFacts> {
        let provider = self.facts_provider.as_ref()?;
        match tokio::time::timeout(self.phase_budget, provider.facts_for(tx)).await {
            Ok(facts) => facts,
            Err(_) => {
                debug!(tx_hash = %tx.raw.tx_hash, "receipt fact extraction timed out");
                None
            }
        }
    }

    /// Directional result: behavioral boosts, thresholds, alert policy.
    fn finalize_directional(
        &self,
        tx: &EnrichedTransfer,
        kind: ClassificationKind,
        confidence: f64,
        mut evidence: Vec<String>,
        tags: std::collections::BTreeSet<String>,
    ) -> Classification {
        let now = Utc::now();
        let stats = self.wallet_stats(tx);
        let applied = behavior::boosts(tx, stats.as_ref(), now);
        let boosted = (confidence + behavior::total(&applied)).clamp(0.0, 1.0);
        for boost in &applied {
            evidence.push(boost.evidence.clone());
        }

        let bucketed = self.aggregator.bucket(kind, boosted);
        let mut classification = Classification::new(bucketed, boosted);
        classification.evidence = evidence;
        classification.tags = tags;
        for tag in &tx.tags {
            classification.tags.insert(tag.clone());
        }
        self.aggregator.finalize(classification)
    }

    /// Protocol result: kind kept as-is, no directional boosts.
    fn finalize_protocol(
        &self,
        tx: &EnrichedTransfer,
        kind: ClassificationKind,
        confidence: f64,
        evidence: Vec<String>,
        tags: std::collections::BTreeSet<String>,
    ) -> Classification {
        let mut classification = Classification::new(kind, confidence);
        classification.evidence = evidence;
        classification.tags = tags;
        for tag in &tx.tags {
            classification.tags.insert(tag.clone());
        }
        self.aggregator.finalize(classification)
    }

    fn wallet_stats(&self, tx: &EnrichedTransfer) -> Option<WhaleStats> {
        let lookup = self.stats_lookup.as_ref()?;
        lookup.stats_for(candidate_wallet(tx)?)
    }
}

/// The side most likely to be the whale: the first wallet-like address.
fn candidate_wallet(tx: &EnrichedTransfer) -> Option<&str> {
    let from_wallet = tx
        .from_label
        .as_ref()
        .map(|label| label.kind.is_wallet())
        .unwrap_or(true);
    let to_wallet = tx
        .to_label
        .as_ref()
        .map(|label| label.kind.is_wallet())
        .unwrap_or(true);
    match (from_wallet, to_wallet) {
        (true, _) => Some(&tx.raw.from_addr),
        (false, true) => Some(&tx.raw.to_addr),
        (false, false) => None,
    }
}
