use super::{DirEntry, FileEnumerator, TextAccessor};
use crate::config::FileScanningConfig;
use crate::error::{CodeMarksError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Workspace backed by directories on the local disk.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    roots: Vec<PathBuf>,
    exclude_dirs: HashSet<String>,
    follow_symlinks: bool,
    max_depth: Option<usize>,
}

impl LocalFileSystem {
    pub fn new<I>(roots: I, config: &FileScanningConfig) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let roots = roots
            .into_iter()
            .map(|root| root.canonicalize().unwrap_or(root))
            .collect();
        Self {
            roots,
            exclude_dirs: config.exclude_dirs.iter().cloned().collect(),
            follow_symlinks: config.follow_symlinks,
            max_depth: config.max_depth,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn is_excluded_name(&self, name: &str) -> bool {
        self.exclude_dirs.contains(name)
    }

    fn root_of(&self, path: &Path) -> Option<&PathBuf> {
        self.roots.iter().find(|root| path.starts_with(root))
    }
}

impl FileEnumerator for LocalFileSystem {
    fn list_content_roots(&self) -> Result<Vec<PathBuf>> {
        Ok(self.roots.iter().filter(|root| root.is_dir()).cloned().collect())
    }

    fn list_children(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let mut children = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| CodeMarksError::file_read(dir, e))? {
            let entry = entry?;
            let path = entry.path();
            let is_directory = if self.follow_symlinks {
                path.is_dir()
            } else {
                entry.file_type()?.is_dir()
            };
            if is_directory && self.is_excluded_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            children.push(DirEntry { path, is_directory });
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    fn list_files(&self) -> Option<Result<Vec<PathBuf>>> {
        let mut files = Vec::new();
        for root in &self.roots {
            let mut walker = WalkDir::new(root).follow_links(self.follow_symlinks).sort_by_file_name();
            if let Some(depth) = self.max_depth {
                walker = walker.max_depth(depth);
            }
            let entries = walker.into_iter().filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.is_excluded_name(&entry.file_name().to_string_lossy())
            });
            for entry in entries {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable entry under {}: {}", root.display(), e),
                }
            }
        }
        debug!(count = files.len(), "Listed workspace files");
        Some(Ok(files))
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn contains(&self, path: &Path) -> bool {
        let Some(root) = self.root_of(path) else {
            return false;
        };
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        let mut components: Vec<_> = relative.components().collect();
        // The file name itself is never an excluded directory.
        components.pop();
        !components
            .iter()
            .any(|component| self.is_excluded_name(&component.as_os_str().to_string_lossy()))
    }
}

impl TextAccessor for LocalFileSystem {
    fn read_text(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| CodeMarksError::file_read(path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn last_modified(&self, path: &Path) -> Result<i64> {
        let modified = std::fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .map_err(|e| CodeMarksError::file_read(path, e))?;
        let millis = modified
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as i64)
            .unwrap_or(0);
        Ok(millis)
    }
}
