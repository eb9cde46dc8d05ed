//! Label store seam
//!
//! The persistent label registry is an external collaborator; only its
//! contract lives here. TTL enforcement is the client's job, so `get`
//! returns whatever the store has and the provider decides freshness.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use types::{AddressLabel, Chain};

/// Read-through label persistence.
#[async_trait]
pub trait LabelStore: Send + Sync {
    async fn get(&self, address: &str, chain: Chain) -> Result<Option<AddressLabel>>;
    async fn upsert(&self, label: AddressLabel) -> Result<()>;
}

/// In-memory store used by tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryLabelStore {
    labels: DashMap<(Chain, String), AddressLabel>,
}

impl InMemoryLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[async_trait]
impl LabelStore for InMemoryLabelStore {
    async fn get(&self, address: &str, chain: Chain) -> Result<Option<AddressLabel>> {
        Ok(self
            .labels
            .get(&(chain, address.to_lowercase()))
            .map(|entry| entry.clone()))
    }

    async fn upsert(&self, label: AddressLabel) -> Result<()> {
        let key = (label.chain, label.address.clone());
        match self.labels.remove(&key) {
            Some((_, existing)) => {
                self.labels.insert(key, existing.prefer(label));
            }
            None => {
                self.labels.insert(key, label);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use types::LabelKind;

    fn label(confidence: f64) -> AddressLabel {
        AddressLabel::new(
            "0xabc",
            Chain::Ethereum,
            LabelKind::Cex,
            Some("Binance".into()),
            confidence,
            Utc.timestamp_opt(0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_upsert_keeps_higher_confidence() {
        let store = InMemoryLabelStore::new();
        store.upsert(label(0.9)).await.unwrap();
        store.upsert(label(0.5)).await.unwrap();

        let got = store.get("0xABC", Chain::Ethereum).await.unwrap().unwrap();
        assert_eq!(got.confidence, 0.9);
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        let store = InMemoryLabelStore::new();
        assert!(store.get("0xdead", Chain::Ethereum).await.unwrap().is_none());
    }
}
