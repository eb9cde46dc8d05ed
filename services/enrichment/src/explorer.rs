//! Remote explorer lookups
//!
//! Only the data contract matters here: given an address, the explorer
//! may know a human-assigned tag for it. The HTTP implementation targets
//! an etherscan-style JSON envelope; anything else can implement the
//! trait.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use types::Chain;

/// Remote source of raw label strings.
#[async_trait]
pub trait ExplorerClient: Send + Sync {
    /// Fetch the raw tag for an address, `None` when the explorer has
    /// nothing.
    async fn fetch_label(&self, address: &str, chain: Chain) -> Result<Option<String>>;
}

/// Etherscan-style HTTP explorer client.
pub struct HttpExplorerClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpExplorerClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl ExplorerClient for HttpExplorerClient {
    async fn fetch_label(&self, address: &str, chain: Chain) -> Result<Option<String>> {
        let mut request = self.client.get(&self.base_url).query(&[
            ("module", "account"),
            ("action", "addresslabel"),
            ("address", address),
            ("chain", chain.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        let body: Value = request.send().await?.error_for_status()?.json().await?;

        // {"status":"1","result":[{"label":"Binance 14"}]}
        let label = body
            .get("result")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("label"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(label.filter(|l| !l.trim().is_empty()))
    }
}
