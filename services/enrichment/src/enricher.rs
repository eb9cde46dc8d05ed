//! Transfer enrichment
//!
//! Attaches labels and a USD value to a raw transfer. Enrichment is
//! best-effort by contract: a missing price or an unreachable label
//! source tags the record instead of failing it.

use crate::labels::LabelProvider;
use crate::prices::{is_stablecoin, PriceResolver};
use crate::tokens::TokenDirectory;
use rust_decimal::Decimal;
use std::sync::Arc;
use types::{EnrichedTransfer, LabelKind, RawTransfer};

/// Symbol substrings that mark airdrop-bait tokens.
const SCAM_MARKERS: &[&str] = &["airdrop", "claim", "visit", ".com", ".io", ".xyz", "reward"];

/// Combines the label provider and price resolver into the enrichment
/// stage's single entry point.
pub struct Enricher {
    labels: Arc<LabelProvider>,
    prices: Arc<PriceResolver>,
    tokens: Arc<TokenDirectory>,
}

impl Enricher {
    pub fn new(labels: Arc<LabelProvider>, prices: Arc<PriceResolver>) -> Self {
        Self {
            labels,
            prices,
            tokens: Arc::new(TokenDirectory::default()),
        }
    }

    pub fn with_tokens(mut self, tokens: Arc<TokenDirectory>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn prices(&self) -> &Arc<PriceResolver> {
        &self.prices
    }

    /// Enrich one transfer. Infallible; gaps become tags.
    pub async fn enrich(&self, raw: RawTransfer) -> EnrichedTransfer {
        let mut enriched = EnrichedTransfer::bare(raw);

        // Fill or teach token metadata before pricing
        if let Some(token_addr) = enriched.raw.token_addr.clone() {
            match &enriched.raw.symbol {
                Some(symbol) => self.tokens.learn(
                    enriched.raw.chain,
                    &token_addr,
                    symbol,
                    enriched.raw.decimals,
                    enriched.raw.block_time,
                ),
                None => {
                    if let Some((symbol, _)) = self.tokens.resolve(
                        enriched.raw.chain,
                        &token_addr,
                        enriched.raw.block_time,
                    ) {
                        enriched.resolved_symbol = Some(symbol);
                        enriched.tag("symbol_resolved");
                    }
                }
            }
        }

        let from_label = self
            .labels
            .lookup(&enriched.raw.from_addr, enriched.raw.chain)
            .await;
        let to_label = self
            .labels
            .lookup(&enriched.raw.to_addr, enriched.raw.chain)
            .await;
        if from_label.kind == LabelKind::Unknown && from_label.confidence == 0.0 {
            enriched.tag("from_unlabeled");
        }
        if to_label.kind == LabelKind::Unknown && to_label.confidence == 0.0 {
            enriched.tag("to_unlabeled");
        }
        enriched.from_label = Some(from_label);
        enriched.to_label = Some(to_label);

        match enriched.symbol_opt().map(str::to_string) {
            Some(symbol) => {
                self.apply_token_heuristics(&mut enriched, &symbol);
                match self
                    .prices
                    .usd_value(&symbol, enriched.raw.amount, enriched.raw.block_time)
                {
                    Some(usd) => enriched.usd_value = usd,
                    None => {
                        enriched.usd_value = Decimal::ZERO;
                        enriched.price_missing = true;
                        enriched.tag("price_missing");
                    }
                }
            }
            None => {
                enriched.usd_value = Decimal::ZERO;
                enriched.price_missing = true;
                enriched.tag("price_missing");
            }
        }

        enriched
    }

    fn apply_token_heuristics(&self, enriched: &mut EnrichedTransfer, symbol: &str) {
        if is_stablecoin(symbol) {
            enriched.token_risk = Some(0.0);
            return;
        }
        let lowered = symbol.to_lowercase();
        if SCAM_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            enriched.token_risk = Some(0.9);
            enriched.tag("scam_token");
        }
    }
}
