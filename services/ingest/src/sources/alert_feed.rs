//! Large-value alert feed
//!
//! Subscribes to a firehose of pre-filtered whale transactions. Payloads
//! arrive as flat JSON objects already carrying chain, symbol and a
//! decimal-adjusted amount, so decoding is a straight field mapping.

use crate::error::{IngestError, Result};
use crate::fanin::SourceOutput;
use crate::source::{ShutdownSignal, Source};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use types::{Chain, RawTransfer};

/// Configuration for one alert feed subscription.
#[derive(Debug, Clone)]
pub struct AlertFeedConfig {
    pub source_id: String,
    pub ws_url: String,
}

/// One alert as published by the feed.
#[derive(Debug, Deserialize)]
struct AlertPayload {
    blockchain: String,
    hash: String,
    from: String,
    to: String,
    symbol: Option<String>,
    token_address: Option<String>,
    /// Decimal-adjusted amount, emitted as string or number.
    amount: Value,
    timestamp: i64,
}

impl AlertPayload {
    fn amount_decimal(&self) -> Decimal {
        match &self.amount {
            Value::String(raw) => Decimal::from_str(raw).unwrap_or(Decimal::ZERO),
            Value::Number(number) => number
                .as_f64()
                .and_then(|f| Decimal::try_from(f).ok())
                .unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        }
    }
}

/// WebSocket source for pre-filtered whale alerts.
pub struct AlertFeedSource {
    config: AlertFeedConfig,
}

impl AlertFeedSource {
    pub fn new(config: AlertFeedConfig) -> Self {
        Self { config }
    }

    fn decode_alert(&self, text: &str) -> Result<Option<RawTransfer>> {
        let payload: AlertPayload = serde_json::from_str(text)?;

        let chain = match Chain::from_str(&payload.blockchain) {
            Ok(chain) => chain,
            Err(_) => {
                // Feeds cover more chains than we ingest; skip quietly
                return Ok(None);
            }
        };

        let block_time = Utc
            .timestamp_opt(payload.timestamp, 0)
            .single()
            .ok_or(IngestError::MissingField {
                field: "timestamp".into(),
            })?;

        Ok(Some(RawTransfer {
            source_id: self.config.source_id.clone(),
            chain,
            tx_hash: payload.hash.clone(),
            log_index: None,
            block_time,
            from_addr: payload.from.clone(),
            to_addr: payload.to.clone(),
            token_addr: payload.token_address.clone(),
            symbol: payload.symbol.clone(),
            amount: payload.amount_decimal(),
            decimals: None,
            native_value: None,
            gas_price_gwei: None,
        }))
    }
}

#[async_trait]
impl Source for AlertFeedSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    async fn run(&mut self, out: &mut SourceOutput, mut shutdown: ShutdownSignal) -> Result<()> {
        url::Url::parse(&self.config.ws_url)
            .map_err(|e| IngestError::Configuration(format!("bad websocket url: {e}")))?;
        info!(source_id = %self.config.source_id, url = %self.config.ws_url, "connecting alert feed");
        let (ws, _) = connect_async(&self.config.ws_url).await?;
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                message = stream.next() => {
                    let message = message.ok_or_else(|| IngestError::ConnectionFailed {
                        source_id: self.config.source_id.clone(),
                        reason: "stream ended".into(),
                    })??;
                    match message {
                        Message::Text(text) => match self.decode_alert(&text) {
                            Ok(Some(event)) => out.send(event).await?,
                            Ok(None) => {}
                            Err(error) => {
                                warn!(source_id = %self.config.source_id, %error, "undecodable alert");
                            }
                        },
                        Message::Ping(payload) => sink.send(Message::Pong(payload)).await?,
                        Message::Close(_) => {
                            return Err(IngestError::ConnectionFailed {
                                source_id: self.config.source_id.clone(),
                                reason: "server closed feed".into(),
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}
