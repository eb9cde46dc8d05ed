//! Entity kind inference from raw label strings
//!
//! Remote explorers hand back free-form tags ("Binance 14", "Uniswap V3:
//! Router 2", "Hop Protocol Bridge"). A prioritized pattern list maps
//! those onto entity kinds; the first match wins. Confidence encodes how
//! the match was made: 0.95 for a known entity name, 0.80 for a kind
//! keyword, 0.60 for a loose category heuristic.

use types::LabelKind;

/// Result of inferring a kind from a raw label.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredKind {
    pub kind: LabelKind,
    pub confidence: f64,
    /// Canonical entity name when a known entity matched.
    pub entity_name: Option<String>,
}

/// Exchange entities matched by name.
const CEX_ENTITIES: &[&str] = &[
    "binance", "coinbase", "kraken", "okx", "okex", "bitfinex", "gemini", "huobi", "kucoin",
    "bybit", "crypto.com", "gate.io", "bitstamp", "upbit",
];

/// Keyword groups in priority order: an earlier group beats a later one.
const KEYWORD_GROUPS: &[(LabelKind, &[&str])] = &[
    (LabelKind::Dex, &["router", "swap", "aggregator", "universal router"]),
    (LabelKind::Bridge, &["bridge", "portal", "wormhole", "across", "hop protocol"]),
    (LabelKind::Lending, &["lending", "aave", "compound", "morpho", "loan"]),
    (LabelKind::Staking, &["staking", "stake", "lido", "rocket pool", "deposit contract"]),
    (LabelKind::Yield, &["yield", "vault", "yearn", "harvest", "farm"]),
    (LabelKind::Mev, &["mev", "searcher", "sandwich", "builder", "flashbots"]),
    (LabelKind::Mixer, &["tornado", "mixer", "blender", "privacy pool"]),
];

/// Loose category heuristics tried last.
const HEURISTIC_GROUPS: &[(LabelKind, &[&str])] = &[
    (LabelKind::Cex, &["exchange", "hot wallet"]),
    (LabelKind::Dex, &["dex", "amm", "pool"]),
    (LabelKind::Whale, &["whale", "fund", "treasury"]),
];

/// Infer the entity kind behind a raw label string.
pub fn infer_kind(raw: &str) -> Option<InferredKind> {
    let lowered = raw.to_lowercase();
    let trimmed = lowered.trim();
    if trimmed.is_empty() {
        return None;
    }

    for entity in CEX_ENTITIES {
        if trimmed.contains(entity) {
            return Some(InferredKind {
                kind: LabelKind::Cex,
                confidence: 0.95,
                entity_name: Some(capitalize(entity)),
            });
        }
    }

    for (kind, keywords) in KEYWORD_GROUPS {
        if keywords.iter().any(|keyword| trimmed.contains(keyword)) {
            return Some(InferredKind {
                kind: *kind,
                confidence: 0.80,
                entity_name: Some(raw.trim().to_string()),
            });
        }
    }

    for (kind, keywords) in HEURISTIC_GROUPS {
        if keywords.iter().any(|keyword| trimmed.contains(keyword)) {
            return Some(InferredKind {
                kind: *kind,
                confidence: 0.60,
                entity_name: Some(raw.trim().to_string()),
            });
        }
    }

    None
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
