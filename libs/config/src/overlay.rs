//! Label registry overlay loading
//!
//! Operators can extend the embedded address registry with a TOML file.
//! Entries are kept as raw strings here; the enrichment service parses
//! chains and kinds so a bad entry degrades to a warning instead of a
//! startup failure.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One overlay entry as written by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelOverlayEntry {
    pub address: String,
    pub chain: String,
    pub kind: String,
    pub name: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.95
}

#[derive(Debug, Deserialize)]
struct OverlayFile {
    #[serde(default)]
    labels: Vec<LabelOverlayEntry>,
}

/// Load overlay entries from a TOML file.
pub fn load_label_overlay(path: &Path) -> Result<Vec<LabelOverlayEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read label overlay {}", path.display()))?;
    let overlay: OverlayFile = toml::from_str(&text)
        .with_context(|| format!("failed to parse label overlay {}", path.display()))?;

    info!(
        path = %path.display(),
        entries = overlay.labels.len(),
        "loaded label overlay"
    );
    Ok(overlay.labels)
}
