use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// Last-scanned modification timestamp per file (milliseconds since the Unix
/// epoch). Only a cache: a missing or stale entry means the file is rescanned.
#[derive(Debug, Default)]
pub struct ScanState {
    entries: Mutex<HashMap<String, i64>>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }

    pub fn get(&self, path: &str) -> Option<i64> {
        self.entries.lock().get(path).copied()
    }

    pub fn set(&self, path: impl Into<String>, timestamp: i64) {
        self.entries.lock().insert(path.into(), timestamp);
    }

    pub fn remove(&self, path: &str) -> Option<i64> {
        self.entries.lock().remove(path)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Whether `path` was last scanned at exactly `timestamp`.
    pub fn is_unchanged(&self, path: &str, timestamp: i64) -> bool {
        self.get(path) == Some(timestamp)
    }

    /// Drops entries whose path fails `keep`.
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|path, _| keep(path));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Plain path → timestamp pairs, ordered, for external persistence.
    pub fn export(&self) -> BTreeMap<String, i64> {
        self.entries
            .lock()
            .iter()
            .map(|(path, timestamp)| (path.clone(), *timestamp))
            .collect()
    }

    /// Replaces the current contents with previously exported pairs.
    pub fn import(&self, entries: BTreeMap<String, i64>) {
        let mut current = self.entries.lock();
        current.clear();
        current.extend(entries);
    }
}
