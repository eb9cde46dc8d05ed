//! Receipt-derived swap facts
//!
//! The blockchain-specific phase decodes a transaction receipt once and
//! publishes the result here; the DEX phase consumes the same facts
//! through the engine's context. Extraction is idempotent and safe to
//! re-run.

use async_trait::async_trait;
use enrichment_service::prices::is_stablecoin;
use rust_decimal::Decimal;
use types::EnrichedTransfer;

/// Majors used by the market-cap heuristic for crypto-to-crypto swaps.
const MAJORS: &[&str] = &[
    "ETH", "WETH", "BTC", "WBTC", "SOL", "BNB", "MATIC", "POL", "XRP", "AVAX",
];

pub fn is_major(symbol: &str) -> bool {
    MAJORS.contains(&symbol.to_uppercase().as_str())
}

/// One token leg of a decoded swap, from the wallet's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenFlow {
    pub symbol: String,
    pub amount: Decimal,
}

impl TokenFlow {
    pub fn new(symbol: impl Into<String>, amount: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
        }
    }

    pub fn is_stable(&self) -> bool {
        is_stablecoin(&self.symbol)
    }

    pub fn is_major(&self) -> bool {
        is_major(&self.symbol)
    }
}

/// Known intent methods decoded from calldata or log shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentMethod {
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    /// Bridge deposit; `to_l2` distinguishes accumulation from exit.
    BridgeDeposit {
        to_l2: bool,
    },
    Stake,
    Unstake,
}

/// Everything the receipt said about this transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapFacts {
    /// Transaction succeeded on chain.
    pub success: bool,
    /// Tokens the wallet acquired.
    pub tokens_in: Vec<TokenFlow>,
    /// Tokens the wallet disposed of.
    pub tokens_out: Vec<TokenFlow>,
    pub method: Option<IntentMethod>,
}

impl SwapFacts {
    pub fn failed() -> Self {
        Self {
            success: false,
            tokens_in: Vec::new(),
            tokens_out: Vec::new(),
            method: None,
        }
    }

    /// True when both swap legs were decoded.
    pub fn has_decoded_swap(&self) -> bool {
        self.success && !self.tokens_in.is_empty() && !self.tokens_out.is_empty()
    }
}

/// Receipt access seam. `None` means the receipt was unavailable, which
/// makes the receipt-driven phases abstain.
#[async_trait]
pub trait ReceiptFactsProvider: Send + Sync {
    async fn facts_for(&self, tx: &EnrichedTransfer) -> Option<SwapFacts>;
}
