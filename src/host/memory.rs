use super::{DirEntry, FileEnumerator, TextAccessor};
use crate::error::{CodeMarksError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct Document {
    text: String,
    modified: i64,
}

#[derive(Debug, Default)]
struct Documents {
    files: BTreeMap<PathBuf, Document>,
    unreadable: HashSet<PathBuf>,
    clock: i64,
}

/// Workspace whose documents live in memory, e.g. unsaved editor buffers.
///
/// Every write bumps a logical modification clock, so rewriting a document
/// always changes its timestamp.
#[derive(Debug)]
pub struct InMemoryWorkspace {
    roots: Vec<PathBuf>,
    documents: RwLock<Documents>,
}

impl InMemoryWorkspace {
    pub fn new<I>(roots: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        Self {
            roots: roots.into_iter().collect(),
            documents: RwLock::new(Documents::default()),
        }
    }

    pub fn write(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        let mut documents = self.documents.write();
        documents.clock += 1;
        let modified = documents.clock;
        documents.files.insert(
            path.into(),
            Document {
                text: text.into(),
                modified,
            },
        );
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.documents.write().files.remove(path).is_some()
    }

    /// Makes reads of `path` fail until cleared.
    pub fn set_unreadable(&self, path: impl Into<PathBuf>, unreadable: bool) {
        let path = path.into();
        let mut documents = self.documents.write();
        if unreadable {
            documents.unreadable.insert(path);
        } else {
            documents.unreadable.remove(&path);
        }
    }

    fn document(&self, path: &Path) -> Result<Document> {
        let documents = self.documents.read();
        if documents.unreadable.contains(path) {
            return Err(CodeMarksError::file_read(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "document locked"),
            ));
        }
        documents
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| CodeMarksError::file_read(path, io::Error::from(io::ErrorKind::NotFound)))
    }
}

impl FileEnumerator for InMemoryWorkspace {
    fn list_content_roots(&self) -> Result<Vec<PathBuf>> {
        Ok(self.roots.clone())
    }

    fn list_children(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let documents = self.documents.read();
        let mut children = BTreeSet::new();
        for path in documents.files.keys() {
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let mut components = relative.components();
            let Some(first) = components.next() else {
                continue;
            };
            let is_directory = components.next().is_some();
            children.insert((dir.join(first), is_directory));
        }
        Ok(children
            .into_iter()
            .map(|(path, is_directory)| DirEntry { path, is_directory })
            .collect())
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.documents
            .read()
            .files
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }

    fn contains(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }
}

impl TextAccessor for InMemoryWorkspace {
    fn read_text(&self, path: &Path) -> Result<String> {
        Ok(self.document(path)?.text)
    }

    fn last_modified(&self, path: &Path) -> Result<i64> {
        Ok(self.document(path)?.modified)
    }
}
