//! Interfaces the engine consumes from its host.
//!
//! The host owns the file tree, document contents and the marker store; the
//! engine only reads through [`FileEnumerator`] and [`TextAccessor`] and
//! writes through [`MarkerStore`].

pub mod local;
pub mod memory;

pub use local::LocalFileSystem;
pub use memory::InMemoryWorkspace;

use crate::error::{CodeMarksError, Result};
use crate::types::{MarkerId, NewMarker, TrackedMarker};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub is_directory: bool,
}

pub trait FileEnumerator: Send + Sync {
    fn list_content_roots(&self) -> Result<Vec<PathBuf>>;

    fn list_children(&self, dir: &Path) -> Result<Vec<DirEntry>>;

    /// Every regular file of the workspace in one call, for hosts that keep
    /// an index. `None` means "walk the tree instead".
    fn list_files(&self) -> Option<Result<Vec<PathBuf>>> {
        None
    }

    fn is_directory(&self, path: &Path) -> bool;

    /// Whether `path` is part of the workspace's tracked content.
    fn contains(&self, path: &Path) -> bool;
}

pub trait TextAccessor: Send + Sync {
    fn read_text(&self, path: &Path) -> Result<String>;

    /// Milliseconds since the Unix epoch.
    fn last_modified(&self, path: &Path) -> Result<i64>;

    fn line_count(&self, path: &Path) -> Result<usize> {
        Ok(self.read_text(path)?.split('\n').count())
    }

    /// Text of a zero-based line without its terminator, `None` past the end.
    fn line_text(&self, path: &Path, line: usize) -> Result<Option<String>> {
        Ok(self
            .read_text(path)?
            .split('\n')
            .nth(line)
            .map(|text| text.trim_end_matches('\r').to_string()))
    }
}

/// Removals and additions that must become visible together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerBatch {
    pub removals: Vec<TrackedMarker>,
    pub additions: Vec<NewMarker>,
}

impl MarkerBatch {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub added: Vec<MarkerId>,
    pub removed: usize,
    pub failures: usize,
    /// The workspace closed before the batch could be (fully) applied.
    pub aborted: bool,
}

pub trait MarkerStore: Send + Sync {
    /// Markers whose group name starts with `group_prefix`.
    fn list_markers(&self, group_prefix: &str) -> Result<Vec<TrackedMarker>>;

    fn add_marker(&self, marker: &NewMarker) -> Result<MarkerId>;

    fn remove_marker(&self, id: MarkerId) -> Result<()>;

    /// Applies a batch, continuing past individual failures. Stores that can
    /// make the whole batch visible at once should override this.
    fn apply_batch(&self, batch: &MarkerBatch, liveness: &Liveness) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for marker in &batch.removals {
            if !liveness.is_alive() {
                outcome.aborted = true;
                return outcome;
            }
            match self.remove_marker(marker.id) {
                Ok(()) => outcome.removed += 1,
                Err(e) => {
                    warn!(id = %marker.id, file = %marker.file, "Failed to remove marker: {}", e);
                    outcome.failures += 1;
                }
            }
        }

        for marker in &batch.additions {
            if !liveness.is_alive() {
                outcome.aborted = true;
                return outcome;
            }
            match self.add_marker(marker) {
                Ok(id) => outcome.added.push(id),
                Err(e) => {
                    warn!(file = %marker.file, line = marker.line, "Failed to add marker: {}", e);
                    outcome.failures += 1;
                }
            }
        }

        outcome
    }
}

/// Shared "is the workspace still open" flag.
#[derive(Debug, Clone)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(CodeMarksError::CollaboratorUnavailable("workspace closed".into()))
        }
    }
}
