//! Stored whale records and suppression events

use crate::chain::Chain;
use crate::classification::ClassificationKind;
use crate::label::LabelKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The persisted, whale-perspective result of the pipeline.
///
/// Keyed by `(chain, tx_hash)`; the sink upserts on that key and keeps the
/// higher-confidence attempt. Internal moves between wallets of the same
/// exchange are dropped before a record is ever built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleRecord {
    pub chain: Chain,
    pub tx_hash: String,
    pub block_time: DateTime<Utc>,
    /// The wallet acting, never an exchange address.
    pub whale_address: Option<String>,
    pub counterparty_address: Option<String>,
    pub counterparty_kind: LabelKind,
    pub is_cex_transaction: bool,
    pub classification: ClassificationKind,
    /// Final confidence in `[0, 1]`.
    pub confidence: f64,
    pub token_symbol: String,
    pub usd_value: Decimal,
    pub from_label: Option<String>,
    pub to_label: Option<String>,
    /// Ordered evidence lines.
    pub evidence: Vec<String>,
    pub source_id: String,
    pub ingested_at: DateTime<Utc>,
}

impl WhaleRecord {
    /// Primary storage key.
    pub fn key(&self) -> (Chain, String) {
        (self.chain, self.tx_hash.clone())
    }

    /// Near-duplicate detection key, present only when a whale was
    /// identified.
    pub fn dedup_key(&self) -> Option<(String, String)> {
        self.whale_address
            .as_ref()
            .map(|w| (w.clone(), self.token_symbol.clone()))
    }
}

/// Duplicate patterns the suppressor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePattern {
    /// The same trade reported from opposite perspectives.
    Mirror,
    /// A TRANSFER shadowing a BUY or SELL of the same funds.
    Shadow,
    /// Same kind, disagreeing counterparty kinds.
    CounterpartyMismatch,
    /// Same kind, disagreeing CEX flags.
    CexFlagMismatch,
}

impl DuplicatePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePattern::Mirror => "mirror",
            DuplicatePattern::Shadow => "shadow",
            DuplicatePattern::CounterpartyMismatch => "counterparty_mismatch",
            DuplicatePattern::CexFlagMismatch => "cex_flag_mismatch",
        }
    }
}

/// Structured event emitted for every suppression or in-place merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionEvent {
    pub incoming_hash: String,
    pub existing_hash: String,
    pub reason: String,
    pub pattern: DuplicatePattern,
    pub time_diff_ms: i64,
    pub usd_diff: Decimal,
}
