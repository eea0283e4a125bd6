//! Persistent position state
//!
//! The state file is a single JSON document rewritten after every tick.
//! Writes go to a sibling temp file that is renamed over the target, so a
//! crash mid-write leaves the previous snapshot intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::common::errors::{BotError, Result};
use crate::common::types::Position;

/// On-disk snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Positions keyed by `SYMBOL:SIDE`
    #[serde(default)]
    pub active_positions: BTreeMap<String, Position>,
    #[serde(default)]
    pub last_tick_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tick_count: u64,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// JSON file store for [`StateSnapshot`]
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last snapshot; a missing file is an empty state
    ///
    /// A corrupt file is reported as [`BotError::Persistence`] so the caller
    /// can decide whether to start fresh.
    pub fn load(&self) -> Result<StateSnapshot> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no state file, starting empty");
            return Ok(StateSnapshot::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(StateSnapshot::default());
        }
        let snapshot: StateSnapshot = serde_json::from_str(&raw).map_err(|e| {
            BotError::Persistence(format!("corrupt state file {}: {}", self.path.display(), e))
        })?;
        debug!(positions = snapshot.active_positions.len(), "state loaded");
        Ok(snapshot)
    }

    /// Load, falling back to an empty state on any error
    pub fn load_or_default(&self) -> StateSnapshot {
        match self.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "discarding unreadable state, reconciling from exchange");
                StateSnapshot::default()
            }
        }
    }

    /// Atomically replace the state file
    pub fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let mut snapshot = snapshot.clone();
        snapshot.saved_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), positions = snapshot.active_positions.len(), "state saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
