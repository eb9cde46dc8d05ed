//! On-chain RPC receipt parser
//!
//! Consumes transaction hashes (typically surfaced by the alert feed
//! without token detail), fetches each receipt over JSON-RPC and emits
//! one event per interesting log: ERC-20 transfers fully decoded, swap
//! logs as thin pool-flow markers with the undecodable fields left
//! empty.

use crate::decode::{self, TxReceipt};
use crate::error::{IngestError, Result};
use crate::fanin::SourceOutput;
use crate::source::{ShutdownSignal, Source};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::{Chain, RawTransfer};

/// Configuration for the RPC parser.
#[derive(Debug, Clone)]
pub struct RpcParserConfig {
    pub source_id: String,
    pub rpc_url: String,
    pub chain: Chain,
    /// Decimals assumed for tokens the receipt does not annotate.
    pub assume_decimals: u8,
    pub request_timeout: Duration,
}

impl RpcParserConfig {
    pub fn new(source_id: impl Into<String>, rpc_url: impl Into<String>, chain: Chain) -> Self {
        Self {
            source_id: source_id.into(),
            rpc_url: rpc_url.into(),
            chain,
            assume_decimals: 18,
            request_timeout: Duration::from_millis(
                config::service::classifier::RECEIPT_DEADLINE_MS,
            ),
        }
    }
}

/// Receipt-decoding source fed by a hash queue.
pub struct RpcParserSource {
    config: RpcParserConfig,
    client: reqwest::Client,
    hashes: mpsc::Receiver<String>,
}

impl RpcParserSource {
    pub fn new(config: RpcParserConfig, hashes: mpsc::Receiver<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            client,
            hashes,
        })
    }

    async fn fetch_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash]
        });
        let response: serde_json::Value = self
            .client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        let result = response.get("result").ok_or(IngestError::MissingField {
            field: "result".into(),
        })?;
        if result.is_null() {
            return Err(IngestError::Decode(format!("no receipt for {tx_hash}")));
        }
        decode::parse_receipt(result)
    }

    /// Turn one receipt into zero or more transfers.
    fn decode_receipt(&self, receipt: &TxReceipt) -> Vec<RawTransfer> {
        if !receipt.status_ok {
            debug!(tx_hash = %receipt.tx_hash, "skipping failed transaction");
            return Vec::new();
        }

        let gas_price_gwei = receipt.effective_gas_price_wei.map(decode::wei_to_gwei);
        // Receipts carry no block timestamp; arrival time is recorded
        // and the poller's copy of the same transfer wins on block time.
        let block_time = Utc::now();

        let mut events = Vec::new();
        for log in &receipt.logs {
            let event = match log.topic0() {
                Some(decode::ERC20_TRANSFER) => {
                    let (Some(from_addr), Some(to_addr)) =
                        (log.topic_address(1), log.topic_address(2))
                    else {
                        continue;
                    };
                    RawTransfer {
                        source_id: self.config.source_id.clone(),
                        chain: self.config.chain,
                        tx_hash: receipt.tx_hash.clone(),
                        log_index: log.log_index,
                        block_time,
                        from_addr,
                        to_addr,
                        token_addr: Some(log.address.clone()),
                        symbol: None,
                        amount: decode::parse_hex_amount(&log.data, self.config.assume_decimals)
                            .unwrap_or(Decimal::ZERO),
                        decimals: Some(self.config.assume_decimals),
                        native_value: None,
                        gas_price_gwei,
                    }
                }
                Some(decode::UNISWAP_V2_SWAP) | Some(decode::UNISWAP_V3_SWAP) => {
                    // Pool-flow marker: token ordering is unknown here,
                    // so amount and symbol stay empty
                    RawTransfer {
                        source_id: self.config.source_id.clone(),
                        chain: self.config.chain,
                        tx_hash: receipt.tx_hash.clone(),
                        log_index: log.log_index,
                        block_time,
                        from_addr: receipt.from.clone().unwrap_or_default(),
                        to_addr: log.address.clone(),
                        token_addr: None,
                        symbol: None,
                        amount: Decimal::ZERO,
                        decimals: None,
                        native_value: None,
                        gas_price_gwei,
                    }
                }
                _ => continue,
            };
            events.push(event);
        }
        events
    }
}

#[async_trait]
impl Source for RpcParserSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    async fn run(&mut self, out: &mut SourceOutput, mut shutdown: ShutdownSignal) -> Result<()> {
        info!(source_id = %self.config.source_id, "rpc parser starting");
        loop {
            // Bind before handling so the receiver borrow ends here
            let next = tokio::select! {
                _ = shutdown.wait() => None,
                tx_hash = self.hashes.recv() => tx_hash,
            };
            let Some(tx_hash) = next else {
                // Shutdown, or every hash producer is gone
                return Ok(());
            };
            match self.fetch_receipt(&tx_hash).await {
                Ok(receipt) => {
                    for event in self.decode_receipt(&receipt) {
                        out.send(event).await?;
                    }
                }
                Err(error) => {
                    // One unfetchable receipt is dropped, not fatal
                    warn!(source_id = %self.config.source_id, %tx_hash, %error, "receipt fetch failed");
                }
            }
        }
    }
}
