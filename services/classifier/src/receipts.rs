//! JSON-RPC receipt fact extraction
//!
//! The production [`ReceiptFactsProvider`]: fetches the transaction
//! receipt over JSON-RPC and reduces its logs to swap facts from the
//! sender's point of view. Token legs are resolved through a small
//! table of majors and stables; an unrecognized token keeps its address
//! as symbol, which the stable/major checks treat as low-cap.

use crate::facts::{IntentMethod, ReceiptFactsProvider, SwapFacts, TokenFlow};
use async_trait::async_trait;
use enrichment_service::tokens::builtin_token;
use ingest_service::decode::{
    self, parse_receipt, TxReceipt, ERC20_TRANSFER, UNISWAP_V2_BURN, UNISWAP_V2_MINT,
    UNISWAP_V2_SWAP, UNISWAP_V3_SWAP,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use types::EnrichedTransfer;

/// An unrecognized token keeps its address as symbol, which the
/// stable/major checks read as low-cap.
fn resolve_token(address: &str) -> (String, u8) {
    match builtin_token(address) {
        Some((symbol, decimals)) => (symbol.to_string(), decimals),
        None => (address.to_string(), 18),
    }
}

/// Receipt facts over a JSON-RPC endpoint.
pub struct RpcReceiptFacts {
    rpc_url: String,
    client: reqwest::Client,
}

impl RpcReceiptFacts {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            rpc_url: rpc_url.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn fetch(&self, tx_hash: &str) -> Option<TxReceipt> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash]
        });
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .ok()?;
        let body: serde_json::Value = response.json().await.ok()?;
        let result = body.get("result")?;
        if result.is_null() {
            debug!(%tx_hash, "no receipt yet");
            return None;
        }
        match parse_receipt(result) {
            Ok(receipt) => Some(receipt),
            Err(error) => {
                warn!(%tx_hash, %error, "receipt parse failed");
                None
            }
        }
    }
}

/// Reduce a parsed receipt to swap facts for `sender`.
pub fn facts_from_receipt(receipt: &TxReceipt, sender: &str) -> SwapFacts {
    if !receipt.status_ok {
        return SwapFacts::failed();
    }

    let sender = sender.to_lowercase();
    let mut tokens_in: Vec<TokenFlow> = Vec::new();
    let mut tokens_out: Vec<TokenFlow> = Vec::new();
    let mut saw_swap = false;
    let mut saw_mint = false;
    let mut saw_burn = false;

    for log in &receipt.logs {
        match log.topic0() {
            Some(ERC20_TRANSFER) => {
                let (Some(from), Some(to)) = (log.topic_address(1), log.topic_address(2)) else {
                    continue;
                };
                let (symbol, decimals) = resolve_token(&log.address);
                let amount =
                    decode::parse_hex_amount(&log.data, decimals).unwrap_or(Decimal::ZERO);
                if to == sender {
                    tokens_in.push(TokenFlow::new(symbol, amount));
                } else if from == sender {
                    tokens_out.push(TokenFlow::new(symbol, amount));
                }
            }
            Some(UNISWAP_V2_SWAP) | Some(UNISWAP_V3_SWAP) => saw_swap = true,
            Some(UNISWAP_V2_MINT) => saw_mint = true,
            Some(UNISWAP_V2_BURN) => saw_burn = true,
            _ => {}
        }
    }

    let method = if saw_mint {
        Some(IntentMethod::AddLiquidity)
    } else if saw_burn {
        Some(IntentMethod::RemoveLiquidity)
    } else if saw_swap {
        Some(IntentMethod::Swap)
    } else {
        None
    };

    SwapFacts {
        success: true,
        tokens_in,
        tokens_out,
        method,
    }
}

#[async_trait]
impl ReceiptFactsProvider for RpcReceiptFacts {
    async fn facts_for(&self, tx: &EnrichedTransfer) -> Option<SwapFacts> {
        if !tx.raw.chain.is_evm() {
            return None;
        }
        let receipt = self.fetch(&tx.raw.tx_hash).await?;
        Some(facts_from_receipt(&receipt, &tx.raw.from_addr))
    }
}
