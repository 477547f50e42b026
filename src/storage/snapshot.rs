use crate::error::{CodeMarksError, Result};
use crate::scan_state::ScanState;
use crate::storage::memory::InMemoryMarkerStore;
use crate::types::TrackedMarker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const STATE_DIR: &str = ".codemarks";
pub const STATE_FILE: &str = "state.json";

const SNAPSHOT_VERSION: u32 = 1;

/// What the CLI keeps between runs: the markers it owns and the scan cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub markers: Vec<TrackedMarker>,
    /// Path → last scanned modification time (ms).
    pub scan_state: BTreeMap<String, i64>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            markers: Vec::new(),
            scan_state: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    pub fn capture(store: &InMemoryMarkerStore, scan_state: &ScanState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            markers: store.all_markers(),
            scan_state: scan_state.export(),
        }
    }

    pub fn default_path(workspace: &Path) -> PathBuf {
        workspace.join(STATE_DIR).join(STATE_FILE)
    }

    /// Missing file means a first run.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No snapshot yet");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| CodeMarksError::file_read(path, e))?;
        let snapshot: Self = serde_json::from_str(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CodeMarksError::Config(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                path.display()
            )));
        }
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), markers = self.markers.len(), "Saved snapshot");
        Ok(())
    }

    pub fn into_parts(self) -> (InMemoryMarkerStore, ScanState) {
        let store = InMemoryMarkerStore::from_markers(self.markers);
        let scan_state = ScanState::new();
        scan_state.import(self.scan_state);
        (store, scan_state)
    }
}
