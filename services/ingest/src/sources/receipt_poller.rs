//! Block-explorer receipt poller
//!
//! Polls the canonical explorer API for confirmed transfers of a watched
//! token list, resuming from a persisted high-watermark. Each poll cycle
//! walks every watched token, emits new rows in block order and advances
//! the watermark only after the cycle completes.

use crate::error::{IngestError, Result};
use crate::fanin::SourceOutput;
use crate::rate_limit::RateLimiter;
use crate::source::{ShutdownSignal, Source};
use crate::watermark::{Watermark, WatermarkStore};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use types::{Chain, RawTransfer};

/// Configuration for one explorer poller.
#[derive(Debug, Clone)]
pub struct ReceiptPollerConfig {
    pub source_id: String,
    pub api_url: String,
    pub api_key: Option<String>,
    pub chain: Chain,
    /// Token contract addresses to watch.
    pub tokens: Vec<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl ReceiptPollerConfig {
    pub fn new(
        source_id: impl Into<String>,
        api_url: impl Into<String>,
        chain: Chain,
        tokens: Vec<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            api_url: api_url.into(),
            api_key: None,
            chain,
            tokens,
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// One row of the explorer's token-transfer listing.
#[derive(Debug, Deserialize)]
struct TokenTxRow {
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "timeStamp")]
    time_stamp: String,
    hash: String,
    from: String,
    to: String,
    #[serde(rename = "contractAddress")]
    contract_address: String,
    #[serde(rename = "tokenSymbol")]
    token_symbol: Option<String>,
    #[serde(rename = "tokenDecimal")]
    token_decimal: Option<String>,
    value: String,
    #[serde(rename = "gasPrice")]
    gas_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenTxResponse {
    status: String,
    #[serde(default)]
    result: Vec<TokenTxRow>,
}

/// Explorer polling source with watermark resume.
pub struct ReceiptPollerSource {
    config: ReceiptPollerConfig,
    client: reqwest::Client,
    limiter: RateLimiter,
    watermarks: Arc<WatermarkStore>,
}

impl ReceiptPollerSource {
    pub fn new(config: ReceiptPollerConfig, watermarks: Arc<WatermarkStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            client,
            limiter: RateLimiter::default(),
            watermarks,
        })
    }

    fn convert_row(&self, row: &TokenTxRow) -> Option<RawTransfer> {
        let block_time = row
            .time_stamp
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())?;

        let decimals = row
            .token_decimal
            .as_deref()
            .and_then(|raw| raw.parse::<u8>().ok());

        // `value` is raw token units; shift by the reported decimals
        let units = Decimal::from_str(&row.value).ok()?;
        let amount = match decimals {
            Some(d) => (units * Decimal::new(1, u32::from(d).min(28))).normalize(),
            None => units,
        };

        let gas_price_gwei = row
            .gas_price
            .as_deref()
            .and_then(|raw| raw.parse::<u128>().ok())
            .map(crate::decode::wei_to_gwei);

        Some(RawTransfer {
            source_id: self.config.source_id.clone(),
            chain: self.config.chain,
            tx_hash: row.hash.clone(),
            log_index: None,
            block_time,
            from_addr: row.from.clone(),
            to_addr: row.to.clone(),
            token_addr: Some(row.contract_address.clone()),
            symbol: row.token_symbol.clone(),
            amount,
            decimals,
            native_value: None,
            gas_price_gwei,
        })
    }

    async fn fetch_token_page(&self, token: &str, start_block: u64) -> Result<Vec<TokenTxRow>> {
        self.limiter.wait().await;

        let mut request = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("module", "account"),
                ("action", "tokentx"),
                ("contractaddress", token),
                ("startblock", &start_block.to_string()),
                ("sort", "asc"),
            ]);
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(IngestError::UpstreamRateLimited {
                source_id: self.config.source_id.clone(),
            });
        }
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(IngestError::AuthenticationFailed {
                source_id: self.config.source_id.clone(),
            });
        }

        let body: TokenTxResponse = response.json().await?;
        // Explorers answer status "0" both for errors and empty pages
        if body.status != "1" && !body.result.is_empty() {
            return Err(IngestError::Decode(format!(
                "explorer error status for token {token}"
            )));
        }
        Ok(body.result)
    }

    /// One full poll cycle over the watched token list. Returns the
    /// number of emitted events.
    async fn poll_cycle(&self, out: &mut SourceOutput) -> Result<usize> {
        let since = self
            .watermarks
            .get(&self.config.source_id)
            .map(|mark| mark.last_block + 1)
            .unwrap_or(0);

        let mut emitted = 0usize;
        let mut highest: Option<Watermark> = None;

        for token in &self.config.tokens {
            let rows = self.fetch_token_page(token, since).await?;
            debug!(
                source_id = %self.config.source_id,
                token,
                rows = rows.len(),
                since,
                "poll page fetched"
            );
            for row in &rows {
                let block = row.block_number.parse::<u64>().unwrap_or(0);
                let Some(event) = self.convert_row(row) else {
                    warn!(source_id = %self.config.source_id, hash = %row.hash, "unconvertible row");
                    continue;
                };
                let mark = Watermark {
                    last_block: block,
                    last_time: event.block_time,
                };
                out.send(event).await?;
                emitted += 1;
                if highest.map(|h| mark.last_block > h.last_block).unwrap_or(true) {
                    highest = Some(mark);
                }
            }
        }

        if let Some(mark) = highest {
            self.watermarks.advance(&self.config.source_id, mark)?;
        }
        Ok(emitted)
    }
}

#[async_trait]
impl Source for ReceiptPollerSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    async fn run(&mut self, out: &mut SourceOutput, mut shutdown: ShutdownSignal) -> Result<()> {
        info!(
            source_id = %self.config.source_id,
            tokens = self.config.tokens.len(),
            "receipt poller starting"
        );
        loop {
            let emitted = self.poll_cycle(out).await?;
            if emitted > 0 {
                debug!(source_id = %self.config.source_id, emitted, "poll cycle complete");
            }
            tokio::select! {
                _ = shutdown.wait() => {
                    self.watermarks.persist()?;
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn poller(dir: &std::path::Path) -> ReceiptPollerSource {
        let store = Arc::new(WatermarkStore::load(dir.join("w.json")));
        ReceiptPollerSource::new(
            ReceiptPollerConfig::new(
                "eth-poller",
                "https://example.invalid/api",
                Chain::Ethereum,
                vec!["0xusdc".into()],
            ),
            store,
        )
        .unwrap()
    }

    fn row() -> TokenTxRow {
        TokenTxRow {
            block_number: "18000000".into(),
            time_stamp: "1700000000".into(),
            hash: "0xHASH".into(),
            from: "0xA".into(),
            to: "0xB".into(),
            contract_address: "0xUSDC".into(),
            token_symbol: Some("USDC".into()),
            token_decimal: Some("6".into()),
            value: "50000000000".into(),
            gas_price: Some("20000000000".into()),
        }
    }

    #[test]
    fn test_convert_row_decimal_adjusts() {
        let dir = tempdir().unwrap();
        let event = poller(dir.path()).convert_row(&row()).unwrap();
        assert_eq!(event.amount, dec!(50_000));
        assert_eq!(event.decimals, Some(6));
        assert_eq!(event.gas_price_gwei, Some(dec!(20)));
        assert_eq!(event.block_time.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_convert_row_without_decimals_keeps_units() {
        let dir = tempdir().unwrap();
        let mut raw = row();
        raw.token_decimal = None;
        raw.value = "42".into();
        let event = poller(dir.path()).convert_row(&raw).unwrap();
        assert_eq!(event.amount, dec!(42));
        assert_eq!(event.decimals, None);
    }

    #[test]
    fn test_convert_row_bad_timestamp_rejected() {
        let dir = tempdir().unwrap();
        let mut raw = row();
        raw.time_stamp = "not-a-time".into();
        assert!(poller(dir.path()).convert_row(&raw).is_none());
    }
}
