//! The address label provider
//!
//! Lookup tiers, cheapest first:
//!
//! 1. embedded registry (built-ins plus operator overlay);
//! 2. striped in-process LRU with per-entry TTL;
//! 3. read-through label store;
//! 4. rate-limited remote explorer lookup, with the raw tag run through
//!    kind inference and written back to the store.
//!
//! `lookup` cannot fail: every error path degrades to an `UNKNOWN` label
//! and network failures are negative-cached for a short window so a dead
//! explorer cannot stall every enrichment worker.

use crate::explorer::ExplorerClient;
use crate::kinds::infer_kind;
use crate::registry::StaticRegistry;
use crate::store::LabelStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use config::EnrichmentConfig;
use governor::{DefaultDirectRateLimiter, Quota};
use lru::LruCache;
use nonzero_ext::nonzero;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use tracing::{debug, warn};
use types::{AddressLabel, Chain, LabelKind};

const STRIPES: usize = config::service::enrichment::LABEL_CACHE_STRIPES;

#[derive(Clone)]
struct CachedLabel {
    label: AddressLabel,
    cached_at: DateTime<Utc>,
    /// Negative entries remember a failed remote lookup.
    negative: bool,
}

type CacheKey = (Chain, String);

/// Infallible address label resolution.
pub struct LabelProvider {
    registry: StaticRegistry,
    stripes: Vec<Mutex<LruCache<CacheKey, CachedLabel>>>,
    store: Option<Arc<dyn LabelStore>>,
    explorer: Option<Arc<dyn ExplorerClient>>,
    limiter: DefaultDirectRateLimiter,
    config: EnrichmentConfig,
}

impl LabelProvider {
    pub fn new(
        registry: StaticRegistry,
        store: Option<Arc<dyn LabelStore>>,
        explorer: Option<Arc<dyn ExplorerClient>>,
        config: EnrichmentConfig,
    ) -> Self {
        let per_stripe = (config.label_cache_capacity / STRIPES).max(1);
        let stripes = (0..STRIPES)
            .map(|_| {
                Mutex::new(LruCache::new(
                    NonZeroUsize::new(per_stripe).unwrap_or(nonzero!(1usize)),
                ))
            })
            .collect();
        let rps = NonZeroU32::new(config.explorer_rate_limit_rps).unwrap_or(nonzero!(5u32));
        Self {
            registry,
            stripes,
            store,
            explorer,
            limiter: DefaultDirectRateLimiter::direct(Quota::per_second(rps)),
            config,
        }
    }

    /// Resolve a label. Never fails; `UNKNOWN` on any error.
    pub async fn lookup(&self, address: &str, chain: Chain) -> AddressLabel {
        let address = address.to_lowercase();
        let now = Utc::now();

        if address.is_empty() {
            return AddressLabel::unknown(address, chain, now);
        }

        // Tier 0: embedded registry
        if let Some(label) = self.registry.lookup(&address, chain) {
            return label;
        }

        // Tier 1: striped LRU
        let key = (chain, address.clone());
        if let Some(cached) = self.cache_get(&key, now) {
            return cached;
        }

        // Tier 2: label store, bounded by the label deadline
        let mut resolved: Option<AddressLabel> = None;
        if let Some(store) = &self.store {
            let deadline = self.config.label_deadline;
            match tokio::time::timeout(deadline, store.get(&address, chain)).await {
                Ok(Ok(Some(label))) => {
                    if !label.is_expired(self.label_ttl(), now) {
                        resolved = Some(label);
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(error)) => {
                    warn!(%address, %error, "label store lookup failed");
                }
                Err(_) => {
                    debug!(%address, "label store lookup timed out");
                }
            }
        }

        // Tier 3: remote explorer, token-bucket gated
        if resolved.is_none() {
            resolved = self.explorer_lookup(&address, chain, now).await;
        }

        let label = match resolved {
            Some(label) => label,
            None => AddressLabel::unknown(&address, chain, now),
        };
        self.cache_put(key, label.clone(), now, label.kind == LabelKind::Unknown);
        label
    }

    async fn explorer_lookup(
        &self,
        address: &str,
        chain: Chain,
        now: DateTime<Utc>,
    ) -> Option<AddressLabel> {
        let explorer = self.explorer.as_ref()?;
        // Skip rather than queue when the bucket is dry; the cache will
        // pick the address up on a later event
        if self.limiter.check().is_err() {
            return None;
        }

        let deadline = self.config.label_deadline;
        match tokio::time::timeout(deadline, explorer.fetch_label(address, chain)).await {
            Ok(Ok(Some(raw))) => {
                let inferred = infer_kind(&raw)?;
                let label = AddressLabel::new(
                    address,
                    chain,
                    inferred.kind,
                    inferred.entity_name,
                    inferred.confidence,
                    now,
                );
                if let Some(store) = &self.store {
                    if let Err(error) = store.upsert(label.clone()).await {
                        warn!(%address, %error, "label store writeback failed");
                    }
                }
                Some(label)
            }
            Ok(Ok(None)) => None,
            Ok(Err(error)) => {
                warn!(%address, %error, "explorer lookup failed, negative-caching");
                self.negative_cache(address, chain, now);
                None
            }
            Err(_) => {
                debug!(%address, "explorer lookup timed out, negative-caching");
                self.negative_cache(address, chain, now);
                None
            }
        }
    }

    fn label_ttl(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.config.label_ttl)
            .unwrap_or_else(|_| ChronoDuration::seconds(3600))
    }

    fn negative_ttl(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.config.negative_ttl)
            .unwrap_or_else(|_| ChronoDuration::seconds(60))
    }

    fn stripe(&self, key: &CacheKey) -> &Mutex<LruCache<CacheKey, CachedLabel>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % STRIPES]
    }

    fn cache_get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<AddressLabel> {
        let mut stripe = self.stripe(key).lock();
        let cached = stripe.get(key)?;
        let ttl = if cached.negative {
            self.negative_ttl()
        } else {
            self.label_ttl()
        };
        if now - cached.cached_at > ttl {
            stripe.pop(key);
            return None;
        }
        Some(cached.label.clone())
    }

    fn cache_put(&self, key: CacheKey, label: AddressLabel, now: DateTime<Utc>, negative: bool) {
        self.stripe(&key).lock().put(
            key,
            CachedLabel {
                label,
                cached_at: now,
                negative,
            },
        );
    }

    fn negative_cache(&self, address: &str, chain: Chain, now: DateTime<Utc>) {
        let key = (chain, address.to_string());
        self.cache_put(
            key,
            AddressLabel::unknown(address, chain, now),
            now,
            true,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EnrichError, Result};
    use crate::store::InMemoryLabelStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingExplorer {
        calls: AtomicU32,
        response: Option<String>,
        fail: bool,
    }

    #[async_trait]
    impl ExplorerClient for CountingExplorer {
        async fn fetch_label(&self, _address: &str, _chain: Chain) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EnrichError::Store("explorer down".into()));
            }
            Ok(self.response.clone())
        }
    }

    fn provider(explorer: Arc<CountingExplorer>) -> LabelProvider {
        LabelProvider::new(
            StaticRegistry::builtin(),
            Some(Arc::new(InMemoryLabelStore::new())),
            Some(explorer),
            EnrichmentConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_registry_short_circuits() {
        let explorer = Arc::new(CountingExplorer {
            calls: AtomicU32::new(0),
            response: None,
            fail: false,
        });
        let provider = provider(explorer.clone());

        let label = provider
            .lookup("0x28C6c06298d514Db089934071355E5743bf21d60", Chain::Ethereum)
            .await;
        assert_eq!(label.kind, LabelKind::Cex);
        assert_eq!(explorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explorer_result_cached_and_stored() {
        let explorer = Arc::new(CountingExplorer {
            calls: AtomicU32::new(0),
            response: Some("Huobi 7".into()),
            fail: false,
        });
        let provider = provider(explorer.clone());

        let first = provider.lookup("0xF00D", Chain::Ethereum).await;
        assert_eq!(first.kind, LabelKind::Cex);
        assert_eq!(first.entity_name.as_deref(), Some("Huobi"));
        assert_eq!(first.confidence, 0.95);

        // Second lookup must come from the cache
        let _second = provider.lookup("0xF00D", Chain::Ethereum).await;
        assert_eq!(explorer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_negative_caches_unknown() {
        let explorer = Arc::new(CountingExplorer {
            calls: AtomicU32::new(0),
            response: None,
            fail: true,
        });
        let provider = provider(explorer.clone());

        let label = provider.lookup("0xDEAD", Chain::Ethereum).await;
        assert_eq!(label.kind, LabelKind::Unknown);

        // The failure is remembered: no second remote call
        let again = provider.lookup("0xDEAD", Chain::Ethereum).await;
        assert_eq!(again.kind, LabelKind::Unknown);
        assert_eq!(explorer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_tiers_configured_returns_unknown() {
        let provider = LabelProvider::new(
            StaticRegistry::builtin(),
            None,
            None,
            EnrichmentConfig::default(),
        );
        let label = provider.lookup("0xbeef", Chain::Polygon).await;
        assert_eq!(label.kind, LabelKind::Unknown);
        assert_eq!(label.confidence, 0.0);
    }
}
