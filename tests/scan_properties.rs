// End-to-end behaviour of scanning a real directory tree.
use codemarks::config::FileScanningConfig;
use codemarks::{InMemoryMarkerStore, LocalFileSystem, ScanOrchestrator, Scheduler};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Workspace {
    _dir: TempDir,
    root: PathBuf,
    store: Arc<InMemoryMarkerStore>,
    orchestrator: Arc<ScanOrchestrator>,
}

impl Workspace {
    fn new(patterns: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let config = FileScanningConfig::default();
        let files = Arc::new(LocalFileSystem::new(vec![root.clone()], &config));
        let store = Arc::new(InMemoryMarkerStore::new());
        let orchestrator = ScanOrchestrator::builder(files.clone(), files, store.clone())
            .patterns(patterns.iter().copied())
            .build();
        Self {
            _dir: dir,
            root,
            store,
            orchestrator: Arc::new(orchestrator),
        }
    }

    fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn markers(&self, path: &Path) -> Vec<(usize, String, String)> {
        self.store
            .markers_for_file(&path.to_string_lossy())
            .into_iter()
            .map(|m| (m.line, m.label, m.group))
            .collect()
    }
}

#[test]
fn test_idempotence() {
    let ws = Workspace::new(&["*"]);
    ws.write("src/main.rs", "fn main() {}\n// CodeMarks: Entry\n");
    ws.write("docs/notes.md", "CodeMarks[docs]: Overview");

    let first = ws.orchestrator.scan_all();
    assert_eq!(first.added, 2);

    let second = ws.orchestrator.scan_all();
    assert_eq!(second.changes(), 0);

    let forced = ws.orchestrator.force_rescan();
    assert_eq!(forced.changes(), 0);
    assert_eq!(forced.kept, 2);
    assert_eq!(ws.store.len(), 2);
}

#[test]
fn test_round_trip() {
    let ws = Workspace::new(&["*"]);
    let path = ws.write("lib.rs", "use std::fmt;\n\n// CodeMarks: Hello\nfn f() {}");

    ws.orchestrator.scan_all();

    assert_eq!(ws.markers(&path), vec![(2, "Hello".to_string(), "CodeMarks".to_string())]);
}

#[test]
fn test_tag_routing() {
    let ws = Workspace::new(&["*"]);
    let path = ws.write("App.kt", "// CodeMarks[foo]: Bar");

    ws.orchestrator.scan_all();

    assert_eq!(ws.markers(&path), vec![(0, "Bar".to_string(), "CodeMarks foo".to_string())]);
}

#[test]
fn test_edit_tracking() {
    let ws = Workspace::new(&["*"]);
    let path = ws.write("a.rs", "x\n// CodeMarks: A\ny");
    ws.orchestrator.scan_all();

    ws.write("a.rs", "x\n// CodeMarks: B\ny");
    let report = ws.orchestrator.scan_file(&path);

    assert_eq!((report.added, report.removed), (1, 1));
    assert_eq!(ws.markers(&path), vec![(1, "B".to_string(), "CodeMarks".to_string())]);
}

#[test]
fn test_deletion_tracking() {
    let ws = Workspace::new(&["*"]);
    let path = ws.write("a.rs", "// CodeMarks: A\n// CodeMarks[x]: B");
    ws.orchestrator.scan_all();
    assert_eq!(ws.markers(&path).len(), 2);

    ws.write("a.rs", "nothing to see here");
    ws.orchestrator.scan_file(&path);

    assert!(ws.markers(&path).is_empty());
}

#[test]
fn test_file_removal_tracking() {
    let ws = Workspace::new(&["*"]);
    let path = ws.write("gone.rs", "// CodeMarks: A");
    ws.orchestrator.scan_all();

    fs::remove_file(&path).unwrap();
    let report = ws.orchestrator.scan_all();

    assert_eq!(report.removed, 1);
    assert!(ws.store.is_empty());
}

#[test]
fn test_unaffected_files_untouched() {
    let ws = Workspace::new(&["*"]);
    let a = ws.write("a.rs", "// CodeMarks: A");
    let b = ws.write("b.rs", "// CodeMarks: B");
    ws.orchestrator.scan_all();
    let b_before = ws.store.markers_for_file(&b.to_string_lossy());

    ws.write("a.rs", "// CodeMarks: A changed");
    ws.orchestrator.scan_file(&a);

    assert_eq!(ws.store.markers_for_file(&b.to_string_lossy()), b_before);
}

#[test]
fn test_glob_filter_boundary() {
    for (patterns, expected) in [
        (vec!["*.json"], 1),
        (vec!["*"], 1),
        (vec!["*.kt", "*.rs"], 0),
        (vec!["*.{json,yaml}"], 1),
    ] {
        let ws = Workspace::new(&patterns);
        let path = ws.write("data.json", "{\"note\": \"CodeMarks: config\"}");

        ws.orchestrator.scan_all();

        assert_eq!(ws.markers(&path).len(), expected, "patterns {:?}", patterns);
    }
}

#[test]
fn test_excluded_directories_are_not_scanned() {
    let ws = Workspace::new(&["*"]);
    ws.write("target/debug/build.rs", "// CodeMarks: generated");
    ws.write(".git/hooks/pre-commit", "# CodeMarks: hook");
    ws.write("src/lib.rs", "// CodeMarks: real");

    ws.orchestrator.scan_all();

    let labels: Vec<_> = ws.store.all_markers().into_iter().map(|m| m.label).collect();
    assert_eq!(labels, vec!["real"]);
}

#[tokio::test]
async fn test_debounce_coalescing() {
    let ws = Workspace::new(&["*"]);
    let path = ws.write("a.rs", "// CodeMarks: v0");
    let scheduler = Scheduler::new(Arc::clone(&ws.orchestrator), Duration::from_millis(60)).unwrap();

    for version in 1..=8 {
        ws.write("a.rs", &format!("// CodeMarks: v{}", version));
        scheduler.notify_file(&path);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(ws.orchestrator.passes(), 1);
    assert_eq!(ws.markers(&path), vec![(0, "v8".to_string(), "CodeMarks".to_string())]);
}
