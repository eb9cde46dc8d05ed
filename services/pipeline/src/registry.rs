//! Whale registry
//!
//! Per-wallet cumulative statistics behind 32-way striped locks.
//! Proven wallets earn a classification confidence boost, so the
//! registry sits on the classifier's hot path; snapshotting works from
//! a copy taken under read locks and never blocks writers for long.

use chrono::{DateTime, Utc};
use classifier_service::WalletStatsLookup;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use types::{ClassificationKind, WhaleStats};

const SHARDS: usize = 32;

/// Striped per-wallet statistics with JSON snapshot persistence.
pub struct WhaleRegistry {
    shards: Vec<RwLock<HashMap<String, WhaleStats>>>,
    snapshot_path: Option<PathBuf>,
}

impl WhaleRegistry {
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        let mut registry = Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            snapshot_path,
        };
        registry.rehydrate();
        registry
    }

    fn shard(&self, wallet: &str) -> &RwLock<HashMap<String, WhaleStats>> {
        let mut hasher = DefaultHasher::new();
        wallet.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARDS]
    }

    /// Fold one stored record into the wallet's stats. Only directional
    /// classifications count as trades; protocol interactions and plain
    /// transfers do not build a trading track record.
    pub fn observe(
        &self,
        wallet: &str,
        classification: ClassificationKind,
        usd: Decimal,
        token: &str,
        now: DateTime<Utc>,
    ) {
        if !classification.is_directional() {
            return;
        }
        let wallet = wallet.to_lowercase();
        let mut shard = self.shard(&wallet).write();
        match shard.get_mut(&wallet) {
            Some(stats) => stats.record_trade(usd, token, now),
            None => {
                shard.insert(wallet, WhaleStats::first(usd, token, now));
            }
        }
    }

    pub fn lookup(&self, wallet: &str) -> Option<WhaleStats> {
        let wallet = wallet.to_lowercase();
        self.shard(&wallet).read().get(&wallet).cloned()
    }

    pub fn wallet_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Write the snapshot file via temp-and-rename. The copy is taken
    /// shard by shard under read locks; writers proceed meanwhile.
    pub fn snapshot(&self) -> std::io::Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let mut wallets: HashMap<String, WhaleStats> = HashMap::new();
        for shard in &self.shards {
            let shard = shard.read();
            wallets.extend(shard.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&wallets)?)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), wallets = wallets.len(), "registry snapshot written");
        Ok(())
    }

    fn rehydrate(&mut self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let wallets: HashMap<String, WhaleStats> = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(wallets) => wallets,
                Err(error) => {
                    warn!(path = %path.display(), %error, "corrupt registry snapshot, starting empty");
                    return;
                }
            },
            Err(_) => return,
        };
        let count = wallets.len();
        for (wallet, stats) in wallets {
            self.shard(&wallet).write().insert(wallet, stats);
        }
        info!(wallets = count, "whale registry rehydrated");
    }
}

impl WalletStatsLookup for WhaleRegistry {
    fn stats_for(&self, address: &str) -> Option<WhaleStats> {
        self.lookup(address)
    }
}
