//! Push-transport chain log stream
//!
//! Subscribes to transfer events over WebSocket and emits one
//! [`RawTransfer`] per decoded log notification. The connection is owned
//! for the lifetime of one `run` call; reconnection is the supervisor's
//! job, so any transport failure simply returns the error.

use crate::decode::{self, parse_log, parse_unix_time};
use crate::error::{IngestError, Result};
use crate::fanin::SourceOutput;
use crate::source::{ShutdownSignal, Source};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use types::{Chain, RawTransfer};

/// Configuration for one log stream subscription.
#[derive(Debug, Clone)]
pub struct LogStreamConfig {
    pub source_id: String,
    pub ws_url: String,
    pub chain: Chain,
    /// Decimals assumed for tokens the stream does not annotate.
    pub assume_decimals: u8,
}

impl LogStreamConfig {
    pub fn new(source_id: impl Into<String>, ws_url: impl Into<String>, chain: Chain) -> Self {
        Self {
            source_id: source_id.into(),
            ws_url: ws_url.into(),
            chain,
            assume_decimals: 18,
        }
    }
}

/// WebSocket subscription source for ERC-20 transfer logs.
pub struct LogStreamSource {
    config: LogStreamConfig,
}

impl LogStreamSource {
    pub fn new(config: LogStreamConfig) -> Self {
        Self { config }
    }

    /// Decode one subscription notification into a transfer, when it is
    /// one we recognize.
    fn decode_notification(&self, text: &str) -> Result<Option<RawTransfer>> {
        let value: Value = serde_json::from_str(text)?;

        // Subscription acks and pings have no params
        let result = match value
            .get("params")
            .and_then(|params| params.get("result"))
        {
            Some(result) => result,
            None => return Ok(None),
        };

        let log = parse_log(result)?;
        if log.topic0() != Some(decode::ERC20_TRANSFER) {
            return Ok(None);
        }

        let from_addr = log.topic_address(1).ok_or(IngestError::MissingField {
            field: "transfer.from".into(),
        })?;
        let to_addr = log.topic_address(2).ok_or(IngestError::MissingField {
            field: "transfer.to".into(),
        })?;

        let amount = decode::parse_hex_amount(&log.data, self.config.assume_decimals)
            .unwrap_or(Decimal::ZERO);

        // Enhanced feeds annotate the block timestamp; plain ones do
        // not, in which case arrival time is the best available.
        let block_time = result
            .get("blockTimestamp")
            .and_then(parse_unix_time)
            .unwrap_or_else(Utc::now);

        let tx_hash = result
            .get("transactionHash")
            .and_then(Value::as_str)
            .ok_or(IngestError::MissingField {
                field: "transactionHash".into(),
            })?
            .to_string();

        Ok(Some(RawTransfer {
            source_id: self.config.source_id.clone(),
            chain: self.config.chain,
            tx_hash,
            log_index: log.log_index,
            block_time,
            from_addr,
            to_addr,
            token_addr: Some(log.address.clone()),
            symbol: result
                .get("tokenSymbol")
                .and_then(Value::as_str)
                .map(str::to_string),
            amount,
            decimals: Some(self.config.assume_decimals),
            native_value: None,
            gas_price_gwei: None,
        }))
    }
}

#[async_trait]
impl Source for LogStreamSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    async fn run(&mut self, out: &mut SourceOutput, mut shutdown: ShutdownSignal) -> Result<()> {
        url::Url::parse(&self.config.ws_url)
            .map_err(|e| IngestError::Configuration(format!("bad websocket url: {e}")))?;
        info!(source_id = %self.config.source_id, url = %self.config.ws_url, "connecting log stream");
        let (ws, _) = connect_async(&self.config.ws_url).await?;
        let (mut sink, mut stream) = ws.split();

        // Subscribe to transfer logs chain-wide; the pipeline filters by
        // value, not the transport.
        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["logs", { "topics": [decode::ERC20_TRANSFER] }]
        });
        sink.send(Message::Text(subscribe.to_string())).await?;

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!(source_id = %self.config.source_id, "log stream shutting down");
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                message = stream.next() => {
                    let message = message.ok_or_else(|| IngestError::ConnectionFailed {
                        source_id: self.config.source_id.clone(),
                        reason: "stream ended".into(),
                    })??;
                    match message {
                        Message::Text(text) => match self.decode_notification(&text) {
                            Ok(Some(event)) => out.send(event).await?,
                            Ok(None) => {}
                            Err(error) => {
                                // One bad notification is dropped, not fatal
                                warn!(source_id = %self.config.source_id, %error, "undecodable notification");
                            }
                        },
                        Message::Ping(payload) => sink.send(Message::Pong(payload)).await?,
                        Message::Close(_) => {
                            return Err(IngestError::ConnectionFailed {
                                source_id: self.config.source_id.clone(),
                                reason: "server closed subscription".into(),
                            });
                        }
                        other => debug!(source_id = %self.config.source_id, ?other, "ignoring frame"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn source() -> LogStreamSource {
        LogStreamSource::new(LogStreamConfig::new(
            "eth-stream",
            "wss://example.invalid/ws",
            Chain::Ethereum,
        ))
    }

    #[test]
    fn test_decode_transfer_notification() {
        // 50 tokens at 18 decimals
        let data = format!("0x{:064x}", 50_000_000_000_000_000_000u128);
        let text = format!(
            r#"{{
                "method": "eth_subscription",
                "params": {{ "result": {{
                    "address": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                    "topics": [
                        "{}",
                        "0x00000000000000000000000028c6c06298d514db089934071355e5743bf21d60",
                        "0x000000000000000000000000abc0000000000000000000000000000000000123"
                    ],
                    "data": "{data}",
                    "logIndex": "0x5",
                    "transactionHash": "0xFEED",
                    "blockTimestamp": "1700000000"
                }} }}
            }}"#,
            decode::ERC20_TRANSFER
        );
        let event = source().decode_notification(&text).unwrap().unwrap();
        assert_eq!(event.from_addr, "0x28c6c06298d514db089934071355e5743bf21d60");
        assert_eq!(event.to_addr, "0xabc0000000000000000000000000000000000123");
        assert_eq!(event.amount, dec!(50)); // 50e18 raw units
        assert_eq!(event.log_index, Some(5));
        assert_eq!(event.block_time.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_ack_frames_ignored() {
        let ack = r#"{"jsonrpc":"2.0","id":1,"result":"0xsub"}"#;
        assert!(source().decode_notification(ack).unwrap().is_none());
    }

    #[test]
    fn test_non_transfer_topic_ignored() {
        let text = r#"{
            "params": { "result": {
                "address": "0xpool",
                "topics": ["0xc42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67"],
                "data": "0x",
                "transactionHash": "0xfeed"
            } }
        }"#;
        assert!(source().decode_notification(text).unwrap().is_none());
    }
}
