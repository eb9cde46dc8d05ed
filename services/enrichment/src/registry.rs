//! Embedded address registry
//!
//! Well-known hot wallets, routers and protocol contracts shipped with
//! the binary. These addresses are public, long-lived and load-bearing
//! for classification, so they resolve without any network round trip.
//! Operators extend or override them through a TOML overlay; runtime
//! discoveries go through the label store instead.

use chrono::Utc;
use config::LabelOverlayEntry;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;
use types::{AddressLabel, Chain, LabelKind};

struct BuiltinEntry {
    address: &'static str,
    chain: Chain,
    kind: LabelKind,
    entity: &'static str,
}

const fn entry(
    address: &'static str,
    chain: Chain,
    kind: LabelKind,
    entity: &'static str,
) -> BuiltinEntry {
    BuiltinEntry {
        address,
        chain,
        kind,
        entity,
    }
}

/// Built-in labels. Addresses must be lowercase.
static BUILTIN: Lazy<Vec<BuiltinEntry>> = Lazy::new(|| {
    use Chain::*;
    use LabelKind::*;
    vec![
        // Exchange hot wallets
        entry("0x28c6c06298d514db089934071355e5743bf21d60", Ethereum, Cex, "Binance"),
        entry("0x21a31ee1afc51d94c2efccaa2092ad1028285549", Ethereum, Cex, "Binance"),
        entry("0xdfd5293d8e347dfe59e90efd55b2956a1343963d", Ethereum, Cex, "Binance"),
        entry("0xf977814e90da44bfa03b6295a0616a897441acec", Ethereum, Cex, "Binance"),
        entry("0x71660c4005ba85c37ccec55d0c4493e66fe775d3", Ethereum, Cex, "Coinbase"),
        entry("0x503828976d22510aad0201ac7ec88293211d23da", Ethereum, Cex, "Coinbase"),
        entry("0xa9d1e08c7793af67e9d92fe308d5697fb81d3e43", Ethereum, Cex, "Coinbase"),
        entry("0x2910543af39aba0cd09dbb2d50200b3e800a63d2", Ethereum, Cex, "Kraken"),
        entry("0x0a869d79a7052c7f1b55a8ebabbea3420f0d1e13", Ethereum, Cex, "Kraken"),
        entry("0x6cc5f688a315f3dc28a7781717a9a798a59fda7b", Ethereum, Cex, "OKX"),
        entry("0x77134cbc06cb00b66f4c7e623d5fdbf6777635ec", Ethereum, Cex, "Bitfinex"),
        entry("0x5f65f7b609678448494de4c87521cdf6cef1e932", Ethereum, Cex, "Gemini"),
        // DEX routers and aggregators
        entry("0x7a250d5630b4cf539739df2c5dacb4c659f2488d", Ethereum, Dex, "Uniswap V2 Router"),
        entry("0xe592427a0aece92de3edee1f18e0157c05861564", Ethereum, Dex, "Uniswap V3 Router"),
        entry("0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45", Ethereum, Dex, "Uniswap V3 Router 2"),
        entry("0x3fc91a3afd70395cd496c647d5a6cc9d4b2b7fad", Ethereum, Dex, "Uniswap Universal Router"),
        entry("0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f", Ethereum, Dex, "SushiSwap Router"),
        entry("0x1111111254eeb25477b68fb85ed929f73a960582", Ethereum, Dex, "1inch Router"),
        entry("0xdef1c0ded9bec7f1a1670819833240f027b25eff", Ethereum, Dex, "0x Exchange Proxy"),
        entry("0xa5e0829caced8ffdd4de3c43696c57f7d7a678ff", Polygon, Dex, "QuickSwap Router"),
        // Bridges
        entry("0xa0c68c638235ee32657e8f720a23cec1bfc77c77", Ethereum, Bridge, "Polygon Bridge"),
        entry("0x8315177ab297ba92a06054ce80a67ed4dbd7ed3a", Ethereum, Bridge, "Arbitrum Bridge"),
        entry("0x3154cf16ccdb4c6d922629664174b904d80f2c35", Ethereum, Bridge, "Base Bridge"),
        entry("0x3ee18b2214aff97000d974cf647e7c347e8fa585", Ethereum, Bridge, "Wormhole Portal"),
        // Staking
        entry("0xae7ab96520de3a18e5e111b5eaab095312d7fe84", Ethereum, Staking, "Lido stETH"),
        entry("0x00000000219ab540356cbb839cbe05303d7705fa", Ethereum, Staking, "Beacon Deposit Contract"),
        // Lending
        entry("0x7d2768de32b0b80b7a3454c06bdac94a69ddc7a9", Ethereum, Lending, "Aave V2 Pool"),
        entry("0x87870bca3f3fd6335c3f4ce8392d69350b4fa4e2", Ethereum, Lending, "Aave V3 Pool"),
        // MEV
        entry("0xae2fc483527b8ef99eb5d9b44875f005ba1fae13", Ethereum, Mev, "MEV Bot"),
        // Mixers
        entry("0x722122df12d4e14e13ac3b6895a86e84145b6967", Ethereum, Mixer, "Tornado Cash"),
    ]
});

/// Confidence for registry hits: curated exact entity matches.
const REGISTRY_CONFIDENCE: f64 = 0.95;

/// The in-process address registry: built-ins plus operator overlay.
pub struct StaticRegistry {
    entries: HashMap<(Chain, String), AddressLabel>,
}

impl StaticRegistry {
    /// Registry with built-in entries only.
    pub fn builtin() -> Self {
        let now = Utc::now();
        let mut entries = HashMap::new();
        for builtin in BUILTIN.iter() {
            let label = AddressLabel::new(
                builtin.address,
                builtin.chain,
                builtin.kind,
                Some(builtin.entity.to_string()),
                REGISTRY_CONFIDENCE,
                now,
            );
            entries.insert((builtin.chain, builtin.address.to_string()), label);
        }
        Self { entries }
    }

    /// Apply operator overlay entries on top of the built-ins.
    ///
    /// A bad row degrades to a warning; an existing address is only
    /// replaced by a higher-confidence entry.
    pub fn with_overlay(mut self, overlay: &[LabelOverlayEntry]) -> Self {
        let now = Utc::now();
        for row in overlay {
            let chain = match Chain::from_str(&row.chain) {
                Ok(chain) => chain,
                Err(_) => {
                    warn!(address = %row.address, chain = %row.chain, "overlay entry with unknown chain skipped");
                    continue;
                }
            };
            let kind = match LabelKind::from_str(&row.kind) {
                Ok(kind) => kind,
                Err(_) => {
                    warn!(address = %row.address, kind = %row.kind, "overlay entry with unknown kind skipped");
                    continue;
                }
            };
            let label = AddressLabel::new(
                row.address.clone(),
                chain,
                kind,
                row.name.clone(),
                row.confidence,
                now,
            );
            let key = (chain, label.address.clone());
            match self.entries.remove(&key) {
                Some(existing) => {
                    self.entries.insert(key, existing.prefer(label));
                }
                None => {
                    self.entries.insert(key, label);
                }
            }
        }
        self
    }

    pub fn lookup(&self, address: &str, chain: Chain) -> Option<AddressLabel> {
        self.entries
            .get(&(chain, address.to_lowercase()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
