use anyhow::{Context, Result};
use colored::Colorize;
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    cli_types::{ListArgs, ScanArgs, WatchArgs},
    config::CodeMarksConfig,
    groups::{organize_groups, MarkerGroup},
    host::LocalFileSystem,
    orchestrator::{ScanOrchestrator, ScanReport, ScanRequest},
    scheduler::Scheduler,
    storage::{snapshot::STATE_DIR, InMemoryMarkerStore, Snapshot},
    types::group_name,
};

pub struct CliApp {
    config: CodeMarksConfig,
    workspace: PathBuf,
    store: Arc<InMemoryMarkerStore>,
    orchestrator: Arc<ScanOrchestrator>,
    snapshot_path: PathBuf,
    verbose: bool,
}

impl CliApp {
    pub fn new(config: CodeMarksConfig, workspace: &Path, verbose: bool) -> Result<Self> {
        info!("Initializing CodeMarks CLI");
        config.validate().context("Invalid configuration")?;

        let workspace = workspace
            .canonicalize()
            .with_context(|| format!("Workspace not found: {}", workspace.display()))?;
        let snapshot_path = Snapshot::default_path(&workspace);
        let snapshot = Snapshot::load(&snapshot_path)
            .with_context(|| format!("Failed to load state from {}", snapshot_path.display()))?;
        let (store, scan_state) = snapshot.into_parts();
        let store = Arc::new(store);

        let files = Arc::new(LocalFileSystem::new(vec![workspace.clone()], &config.file_scanning));
        let orchestrator = ScanOrchestrator::builder(files.clone(), files, store.clone())
            .config(&config)
            .scan_state(Arc::new(scan_state))
            .build();

        Ok(Self {
            config,
            workspace,
            store,
            orchestrator: Arc::new(orchestrator),
            snapshot_path,
            verbose,
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn store(&self) -> &Arc<InMemoryMarkerStore> {
        &self.store
    }

    pub async fn scan(&self, args: &ScanArgs) -> Result<ScanReport> {
        if self.verbose {
            println!("{} {}", "Scanning".cyan().bold(), self.workspace.display());
            println!("  patterns: {}", self.config.file_scanning.patterns.join(", "));
        }

        let request = if args.force {
            ScanRequest::ForceRescan
        } else {
            ScanRequest::Workspace
        };
        let report = self.orchestrator.spawn(request).await.context("Scan task failed")?;
        self.save()?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize scan report")?);
        } else {
            print_report(&report);
        }
        Ok(report)
    }

    pub fn list(&self, args: &ListArgs) -> Result<Vec<MarkerGroup>> {
        let base = self.orchestrator.base_group();
        let mut groups = organize_groups(self.store.as_ref(), base).context("Failed to list markers")?;
        if let Some(tag) = &args.tag {
            let wanted = group_name(base, Some(tag.as_str()));
            groups.retain(|group| group.name == wanted);
        }

        if args.json {
            println!("{}", serde_json::to_string_pretty(&groups).context("Failed to serialize markers")?);
            return Ok(groups);
        }

        if groups.is_empty() {
            println!("{}", "No markers. Run 'codemarks scan' first.".yellow());
        }
        for group in &groups {
            println!("{} ({})", group.name.bold().green(), group.markers.len());
            for marker in &group.markers {
                let file = Path::new(&marker.file);
                let shown = file.strip_prefix(&self.workspace).unwrap_or(file);
                println!(
                    "  {}  {}:{}",
                    marker.label,
                    shown.display().to_string().dimmed(),
                    marker.line + 1
                );
            }
        }
        Ok(groups)
    }

    pub fn show_config(&self) -> Result<()> {
        let rendered = self.config.to_toml_string().context("Failed to render configuration")?;
        println!("{}", "# Effective configuration".dimmed());
        println!("{}", rendered);
        if let Some(user_config) = CodeMarksConfig::user_config_path() {
            println!("{} {}", "# User config:".dimmed(), user_config.display().to_string().dimmed());
        }
        println!("{} {}", "# State file:".dimmed(), self.snapshot_path.display().to_string().dimmed());
        Ok(())
    }

    /// Initial scan, then rescans on file changes until Ctrl-C.
    pub async fn watch(&self, args: &WatchArgs) -> Result<()> {
        let debounce = args
            .debounce_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.scheduler.debounce());

        let initial = self.orchestrator.spawn(ScanRequest::Workspace).await.context("Initial scan failed")?;
        print_report(&initial);
        self.save()?;

        let scheduler = Arc::new(Scheduler::new(Arc::clone(&self.orchestrator), debounce)?);
        let mut reports = scheduler.subscribe();

        let notifier = Arc::clone(&scheduler);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                let paths: Vec<PathBuf> = event.paths.into_iter().filter(|p| !is_state_path(p)).collect();
                if !paths.is_empty() {
                    debug!(count = paths.len(), "Files changed");
                    notifier.notify_files(paths);
                }
            }
            Err(e) => warn!("File watcher error: {}", e),
        })
        .context("Failed to create file watcher")?;
        watcher
            .watch(&self.workspace, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", self.workspace.display()))?;

        println!(
            "{} {} (Ctrl-C to stop)",
            "Watching".cyan().bold(),
            self.workspace.display()
        );

        loop {
            tokio::select! {
                Ok(report) = reports.recv() => {
                    if report.changes() > 0 {
                        print_report(&report);
                        self.save()?;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping watch");
                    break;
                }
            }
        }

        scheduler.shutdown();
        drop(watcher);
        self.save()
    }

    fn save(&self) -> Result<()> {
        Snapshot::capture(&self.store, self.orchestrator.scan_state())
            .save(&self.snapshot_path)
            .with_context(|| format!("Failed to save state to {}", self.snapshot_path.display()))
    }
}

fn is_state_path(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::Normal(name) if name == STATE_DIR))
}

fn print_report(report: &ScanReport) {
    if report.aborted {
        println!("{}", "Scan aborted: workspace closed".red().bold());
        return;
    }
    println!(
        "{} {} scanned, {} unchanged, {} unreadable",
        "Files:".bold(),
        report.files_scanned,
        report.files_skipped,
        report.files_failed
    );
    println!(
        "{} {} added, {} removed, {} kept",
        "Markers:".bold(),
        report.added.to_string().green(),
        report.removed.to_string().red(),
        report.kept
    );
    if report.store_failures > 0 {
        println!(
            "{}",
            format!("{} marker changes failed and will be retried", report.store_failures).yellow()
        );
    }
    println!("{} {}ms", "Done in".dimmed(), report.duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "// CodeMarks: Entry\n// CodeMarks[api]: Public").unwrap();
        dir
    }

    fn scan_args(dir: &TempDir) -> ScanArgs {
        ScanArgs {
            path: dir.path().to_path_buf(),
            force: false,
            json: true,
        }
    }

    #[tokio::test]
    async fn test_scan_persists_state() {
        let dir = workspace();
        let app = CliApp::new(CodeMarksConfig::default(), dir.path(), false).unwrap();

        let report = app.scan(&scan_args(&dir)).await.unwrap();
        assert_eq!(report.added, 2);
        assert!(dir.path().join(".codemarks/state.json").is_file());

        // A fresh app picks the markers back up and finds nothing to do.
        let reopened = CliApp::new(CodeMarksConfig::default(), dir.path(), false).unwrap();
        assert_eq!(reopened.store().len(), 2);
        let report = reopened.scan(&scan_args(&dir)).await.unwrap();
        assert_eq!(report.changes(), 0);
        assert_eq!(report.files_skipped, 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_tag() {
        let dir = workspace();
        let app = CliApp::new(CodeMarksConfig::default(), dir.path(), false).unwrap();
        app.scan(&scan_args(&dir)).await.unwrap();

        let all = app
            .list(&ListArgs {
                path: dir.path().to_path_buf(),
                tag: None,
                json: true,
            })
            .unwrap();
        assert_eq!(all.len(), 2);

        let api = app
            .list(&ListArgs {
                path: dir.path().to_path_buf(),
                tag: Some("api".into()),
                json: false,
            })
            .unwrap();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].markers[0].label, "Public");
    }

    #[test]
    fn test_missing_workspace() {
        assert!(CliApp::new(CodeMarksConfig::default(), Path::new("/definitely/not/here"), false).is_err());
    }

    #[test]
    fn test_state_paths_are_ignored() {
        assert!(is_state_path(Path::new("/ws/.codemarks/state.json")));
        assert!(!is_state_path(Path::new("/ws/src/codemarks.rs")));
    }
}
