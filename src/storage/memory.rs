use crate::error::{CodeMarksError, Result};
use crate::host::{BatchOutcome, Liveness, MarkerBatch, MarkerStore};
use crate::types::{MarkerId, NewMarker, TrackedMarker};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::SystemTime;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerMapMetadata {
    pub total_markers: usize,
    pub total_files: usize,
    pub groups: HashSet<String>,
    pub last_updated: SystemTime,
}

impl Default for MarkerMapMetadata {
    fn default() -> Self {
        Self {
            total_markers: 0,
            total_files: 0,
            groups: HashSet::new(),
            last_updated: SystemTime::now(),
        }
    }
}

/// Marker storage with per-file and per-group lookups.
#[derive(Debug, Clone, Default)]
struct MarkerMap {
    markers: BTreeMap<MarkerId, TrackedMarker>,

    // Fast indexes
    file_index: HashMap<String, HashSet<MarkerId>>,
    group_index: HashMap<String, HashSet<MarkerId>>,

    next_id: u64,
    metadata: MarkerMapMetadata,
}

impl MarkerMap {
    fn insert(&mut self, marker: &NewMarker) -> MarkerId {
        self.next_id += 1;
        let id = MarkerId(self.next_id);
        self.insert_with_id(TrackedMarker {
            id,
            file: marker.file.clone(),
            line: marker.line,
            label: marker.label.clone(),
            group: marker.group.clone(),
        });
        id
    }

    fn insert_with_id(&mut self, marker: TrackedMarker) {
        self.next_id = self.next_id.max(marker.id.0);
        self.file_index.entry(marker.file.clone()).or_default().insert(marker.id);
        self.group_index.entry(marker.group.clone()).or_default().insert(marker.id);
        self.markers.insert(marker.id, marker);
    }

    fn remove(&mut self, id: MarkerId) -> Option<TrackedMarker> {
        let marker = self.markers.remove(&id)?;
        remove_from_index(&mut self.file_index, &marker.file, id);
        remove_from_index(&mut self.group_index, &marker.group, id);
        Some(marker)
    }

    fn update_metadata(&mut self) {
        self.metadata.total_markers = self.markers.len();
        self.metadata.total_files = self.file_index.len();
        self.metadata.groups = self.group_index.keys().cloned().collect();
        self.metadata.last_updated = SystemTime::now();
    }
}

fn remove_from_index(index: &mut HashMap<String, HashSet<MarkerId>>, key: &str, id: MarkerId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

/// In-process [`MarkerStore`]. Batches are applied under a single write lock,
/// so readers never observe half of a batch.
#[derive(Debug, Default)]
pub struct InMemoryMarkerStore {
    inner: RwLock<MarkerMap>,
}

impl InMemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from previously persisted markers, keeping their ids.
    pub fn from_markers<I>(markers: I) -> Self
    where
        I: IntoIterator<Item = TrackedMarker>,
    {
        let mut map = MarkerMap::default();
        for marker in markers {
            map.insert_with_id(marker);
        }
        map.update_metadata();
        Self {
            inner: RwLock::new(map),
        }
    }

    pub fn all_markers(&self) -> Vec<TrackedMarker> {
        self.inner.read().markers.values().cloned().collect()
    }

    pub fn markers_for_file(&self, file: &str) -> Vec<TrackedMarker> {
        let inner = self.inner.read();
        let mut markers: Vec<TrackedMarker> = inner
            .file_index
            .get(file)
            .map(|ids| ids.iter().filter_map(|id| inner.markers.get(id)).cloned().collect())
            .unwrap_or_default();
        markers.sort_by_key(|marker| (marker.line, marker.id));
        markers
    }

    pub fn markers_in_group(&self, group: &str) -> Vec<TrackedMarker> {
        let inner = self.inner.read();
        let mut markers: Vec<TrackedMarker> = inner
            .group_index
            .get(group)
            .map(|ids| ids.iter().filter_map(|id| inner.markers.get(id)).cloned().collect())
            .unwrap_or_default();
        markers.sort_by_key(|marker| marker.id);
        markers
    }

    pub fn get(&self, id: MarkerId) -> Option<TrackedMarker> {
        self.inner.read().markers.get(&id).cloned()
    }

    pub fn metadata(&self) -> MarkerMapMetadata {
        self.inner.read().metadata.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().markers.is_empty()
    }
}

impl MarkerStore for InMemoryMarkerStore {
    fn list_markers(&self, group_prefix: &str) -> Result<Vec<TrackedMarker>> {
        Ok(self
            .inner
            .read()
            .markers
            .values()
            .filter(|marker| marker.group.starts_with(group_prefix))
            .cloned()
            .collect())
    }

    fn add_marker(&self, marker: &NewMarker) -> Result<MarkerId> {
        let mut inner = self.inner.write();
        let id = inner.insert(marker);
        inner.update_metadata();
        Ok(id)
    }

    fn remove_marker(&self, id: MarkerId) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.remove(id) {
            Some(_) => {
                inner.update_metadata();
                Ok(())
            }
            None => Err(CodeMarksError::MarkerStore(format!("unknown marker {}", id))),
        }
    }

    fn apply_batch(&self, batch: &MarkerBatch, liveness: &Liveness) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut inner = self.inner.write();

        // Checked under the lock: either the whole batch lands or none of it.
        if !liveness.is_alive() {
            outcome.aborted = true;
            return outcome;
        }

        for marker in &batch.removals {
            match inner.remove(marker.id) {
                Some(_) => outcome.removed += 1,
                None => {
                    warn!(id = %marker.id, "Marker already gone; nothing to remove");
                    outcome.failures += 1;
                }
            }
        }
        for marker in &batch.additions {
            outcome.added.push(inner.insert(marker));
        }
        inner.update_metadata();

        debug!(
            added = outcome.added.len(),
            removed = outcome.removed,
            total = inner.markers.len(),
            "Applied marker batch"
        );
        outcome
    }
}
