//! High-watermark persistence for polling sources
//!
//! Pollers resume from the last confirmed block instead of re-reading
//! history after a restart. Watermarks live in one JSON map keyed by
//! source id and are written with an atomic rename so a crash mid-write
//! never corrupts the file.

use crate::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Progress marker for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub last_block: u64,
    pub last_time: DateTime<Utc>,
}

/// Shared watermark map with JSON persistence.
pub struct WatermarkStore {
    path: PathBuf,
    marks: Mutex<HashMap<String, Watermark>>,
}

impl WatermarkStore {
    /// Load existing watermarks, or start empty when the file is absent
    /// or unreadable (a poller then re-scans from its configured start).
    pub fn load(path: PathBuf) -> Self {
        let marks = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, Watermark>>(&bytes) {
                Ok(map) => map,
                Err(error) => {
                    warn!(path = %path.display(), %error, "corrupt watermark file, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            marks: Mutex::new(marks),
        }
    }

    pub fn get(&self, source_id: &str) -> Option<Watermark> {
        self.marks.lock().get(source_id).copied()
    }

    /// Advance a source's watermark and persist the whole map.
    pub fn advance(&self, source_id: &str, mark: Watermark) -> Result<()> {
        {
            let mut marks = self.marks.lock();
            let entry = marks.entry(source_id.to_string()).or_insert(mark);
            if mark.last_block >= entry.last_block {
                *entry = mark;
            }
        }
        self.persist()
    }

    /// Write the map to disk via a temp file and rename.
    pub fn persist(&self) -> Result<()> {
        let snapshot = self.marks.lock().clone();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), sources = snapshot.len(), "watermarks persisted");
        Ok(())
    }
}
