//! Raw and enriched transfer events

use crate::chain::Chain;
use crate::label::AddressLabel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One ingested transfer, normalized from whatever a source emits.
///
/// `(chain, tx_hash, log_index)` uniquely identifies a raw event across
/// sources. Created by exactly one source, consumed exactly once by the
/// pipeline, never mutated after emission. A source that cannot decode a
/// field leaves it `None`; every downstream stage tolerates gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransfer {
    /// Stream identifier of the emitting source.
    pub source_id: String,
    pub chain: Chain,
    /// Lowercased transaction hash.
    pub tx_hash: String,
    /// Log position within the transaction, when the source knows it.
    pub log_index: Option<u32>,
    /// Block timestamp, not ingest time.
    pub block_time: DateTime<Utc>,
    pub from_addr: String,
    pub to_addr: String,
    pub token_addr: Option<String>,
    pub symbol: Option<String>,
    /// Decimal-adjusted token amount.
    pub amount: Decimal,
    pub decimals: Option<u8>,
    /// Native coin value carried by the transaction, if any.
    pub native_value: Option<Decimal>,
    /// Effective gas price in gwei, EVM chains only.
    pub gas_price_gwei: Option<Decimal>,
}

impl RawTransfer {
    /// Lowercase addresses, hash and token address in place.
    ///
    /// Sources call this once before emitting; the rest of the pipeline
    /// relies on canonical form for registry and cache lookups.
    pub fn normalize(&mut self) {
        self.tx_hash = self.tx_hash.to_lowercase();
        self.from_addr = self.from_addr.to_lowercase();
        self.to_addr = self.to_addr.to_lowercase();
        if let Some(token) = &self.token_addr {
            self.token_addr = Some(token.to_lowercase());
        }
    }

    /// The cross-source identity of this event.
    pub fn identity(&self) -> (Chain, &str, Option<u32>) {
        (self.chain, &self.tx_hash, self.log_index)
    }
}

/// A raw transfer plus everything the enrichment stage could resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTransfer {
    pub raw: RawTransfer,
    /// USD value at event time; `0` when no price was available.
    pub usd_value: Decimal,
    /// Set when no price could be resolved within the staleness budget.
    pub price_missing: bool,
    pub from_label: Option<AddressLabel>,
    pub to_label: Option<AddressLabel>,
    /// Symbol resolved by enrichment when the source left it empty.
    /// The raw event itself stays untouched.
    pub resolved_symbol: Option<String>,
    pub token_age_days: Option<u32>,
    /// Risk score in `[0, 1]` from token heuristics, when known.
    pub token_risk: Option<f64>,
    /// Enrichment annotations (`price_missing`, `label_timeout`, ...).
    pub tags: BTreeSet<String>,
}

impl EnrichedTransfer {
    /// Wrap a raw transfer with nothing resolved yet.
    pub fn bare(raw: RawTransfer) -> Self {
        Self {
            raw,
            usd_value: Decimal::ZERO,
            price_missing: false,
            from_label: None,
            to_label: None,
            resolved_symbol: None,
            token_age_days: None,
            token_risk: None,
            tags: BTreeSet::new(),
        }
    }

    /// The best known symbol: the source's, else enrichment's.
    pub fn symbol_opt(&self) -> Option<&str> {
        self.raw
            .symbol
            .as_deref()
            .or(self.resolved_symbol.as_deref())
    }

    pub fn symbol(&self) -> &str {
        self.symbol_opt().unwrap_or("UNKNOWN")
    }

    pub fn tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
