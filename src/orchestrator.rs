use crate::config::CodeMarksConfig;
use crate::filter::FileFilter;
use crate::host::{FileEnumerator, Liveness, MarkerStore, TextAccessor};
use crate::matcher::PatternMatcher;
use crate::reconciler::{ReconcilePlan, Reconciler, Validator};
use crate::scan_state::ScanState;
use crate::types::{is_managed_group, MarkCandidate, TrackedMarker, DEFAULT_BASE_GROUP};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What a scan covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScanRequest {
    Workspace,
    File(PathBuf),
    /// Forget the scan cache, then scan the whole workspace.
    ForceRescan,
}

impl fmt::Display for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workspace => write!(f, "workspace"),
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::ForceRescan => write!(f, "forced workspace rescan"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub files_scanned: usize,
    /// Unchanged since their last scan.
    pub files_skipped: usize,
    pub files_failed: usize,
    pub marks_found: usize,
    pub added: usize,
    pub removed: usize,
    pub kept: usize,
    pub store_failures: usize,
    /// The workspace closed; nothing past the abort point was applied.
    pub aborted: bool,
    pub duration_ms: u64,
}

impl ScanReport {
    pub fn changes(&self) -> usize {
        self.added + self.removed
    }
}

/// A file read during the current pass.
struct ExtractedFile {
    key: String,
    modified: i64,
    text: String,
    candidates: Vec<MarkCandidate>,
}

pub struct ScanOrchestratorBuilder {
    files: Arc<dyn FileEnumerator>,
    text: Arc<dyn TextAccessor>,
    store: Arc<dyn MarkerStore>,
    patterns: Vec<String>,
    base_group: String,
    parallel: bool,
    scan_state: Option<Arc<ScanState>>,
    liveness: Option<Liveness>,
}

impl ScanOrchestratorBuilder {
    pub fn config(mut self, config: &CodeMarksConfig) -> Self {
        self.patterns = config.file_scanning.patterns.clone();
        self.parallel = config.file_scanning.parallel;
        self.base_group = config.markers.base_group.clone();
        self
    }

    pub fn patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn base_group(mut self, base_group: impl Into<String>) -> Self {
        self.base_group = base_group.into();
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn scan_state(mut self, scan_state: Arc<ScanState>) -> Self {
        self.scan_state = Some(scan_state);
        self
    }

    pub fn liveness(mut self, liveness: Liveness) -> Self {
        self.liveness = Some(liveness);
        self
    }

    pub fn build(self) -> ScanOrchestrator {
        ScanOrchestrator {
            files: self.files,
            text: self.text,
            store: self.store,
            filter: RwLock::new(FileFilter::new(&self.patterns)),
            scan_state: self.scan_state.unwrap_or_default(),
            reconciler: Reconciler::new(self.base_group),
            matcher: PatternMatcher::new(),
            liveness: self.liveness.unwrap_or_default(),
            parallel: self.parallel,
            scan_lock: Mutex::new(()),
            passes: AtomicU64::new(0),
        }
    }
}

/// Entry point for "scan everything" and "scan one file".
///
/// Scans are serialized: a second caller blocks until the running pass has
/// applied its batch.
pub struct ScanOrchestrator {
    files: Arc<dyn FileEnumerator>,
    text: Arc<dyn TextAccessor>,
    store: Arc<dyn MarkerStore>,
    filter: RwLock<FileFilter>,
    scan_state: Arc<ScanState>,
    reconciler: Reconciler,
    matcher: PatternMatcher,
    liveness: Liveness,
    parallel: bool,
    scan_lock: Mutex<()>,
    passes: AtomicU64,
}

impl ScanOrchestrator {
    pub fn builder(
        files: Arc<dyn FileEnumerator>,
        text: Arc<dyn TextAccessor>,
        store: Arc<dyn MarkerStore>,
    ) -> ScanOrchestratorBuilder {
        let defaults = CodeMarksConfig::default();
        ScanOrchestratorBuilder {
            files,
            text,
            store,
            patterns: defaults.file_scanning.patterns,
            base_group: DEFAULT_BASE_GROUP.to_string(),
            parallel: defaults.file_scanning.parallel,
            scan_state: None,
            liveness: None,
        }
    }

    pub fn scan_state(&self) -> &Arc<ScanState> {
        &self.scan_state
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn base_group(&self) -> &str {
        self.reconciler.base_group()
    }

    /// Completed scan-and-apply passes, aborted ones included.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    /// Replaces the file patterns after a settings change.
    pub fn set_patterns<I, S>(&self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        *self.filter.write() = FileFilter::new(patterns);
    }

    pub fn is_eligible(&self, path: &Path) -> bool {
        self.files.contains(path) && self.filter.read().should_scan_path(path, self.files.is_directory(path))
    }

    pub fn execute(&self, request: &ScanRequest) -> ScanReport {
        match request {
            ScanRequest::Workspace => self.scan_all(),
            ScanRequest::File(path) => self.scan_file(path),
            ScanRequest::ForceRescan => self.force_rescan(),
        }
    }

    /// Runs `request` on the blocking pool; await the handle to wait for it.
    pub fn spawn(self: &Arc<Self>, request: ScanRequest) -> tokio::task::JoinHandle<ScanReport> {
        let orchestrator = Arc::clone(self);
        tokio::task::spawn_blocking(move || orchestrator.execute(&request))
    }

    pub fn force_rescan(&self) -> ScanReport {
        let _guard = self.scan_lock.lock();
        info!("Clearing scan state for a full rescan");
        self.scan_state.clear();
        self.scan_all_locked()
    }

    pub fn scan_all(&self) -> ScanReport {
        let _guard = self.scan_lock.lock();
        self.scan_all_locked()
    }

    /// Caller holds `scan_lock`.
    fn scan_all_locked(&self) -> ScanReport {
        let start = Instant::now();
        let mut report = ScanReport::default();
        info!("Scanning workspace for marks");

        if !self.liveness.is_alive() {
            return self.abort(report, "before enumeration");
        }

        let filter = self.filter.read().clone();
        let eligible = match self.eligible_files(&filter) {
            Ok(eligible) => eligible,
            Err(e) if e.is_fatal() => return self.abort(report, "during enumeration"),
            Err(e) => {
                error!("Failed to enumerate workspace files: {}", e);
                return self.finish(report, start);
            }
        };

        let mut pending = Vec::new();
        for path in &eligible {
            let key = path_key(path);
            match self.text.last_modified(path) {
                Ok(modified) if self.scan_state.is_unchanged(&key, modified) => report.files_skipped += 1,
                Ok(modified) => pending.push((path.clone(), key, modified)),
                Err(e) if e.is_fatal() => return self.abort(report, "while reading files"),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    report.files_failed += 1;
                }
            }
        }

        let extracted = match self.extract_all(pending, &mut report) {
            Ok(extracted) => extracted,
            Err(_) => return self.abort(report, "while reading files"),
        };

        if !self.liveness.is_alive() {
            return self.abort(report, "after extraction");
        }

        let tracked = match self.tracked_markers(|_| true) {
            Ok(tracked) => tracked,
            Err(e) if e.is_fatal() => return self.abort(report, "while listing markers"),
            Err(e) => {
                error!("Failed to list tracked markers: {}", e);
                return self.finish(report, start);
            }
        };

        let plan = match self.plan(&extracted, &tracked, &filter) {
            Ok(plan) => plan,
            Err(_) => return self.abort(report, "while validating markers"),
        };
        if !self.apply(plan, &extracted, &mut report) {
            return self.abort(report, "before applying changes");
        }

        let known: HashSet<String> = eligible.iter().map(|path| path_key(path)).collect();
        let pruned = self.scan_state.retain(|path| known.contains(path));
        if pruned > 0 {
            debug!(pruned, "Dropped scan state of files no longer in the workspace");
        }

        self.finish(report, start)
    }

    pub fn scan_file(&self, path: &Path) -> ScanReport {
        let _guard = self.scan_lock.lock();
        let start = Instant::now();
        let mut report = ScanReport::default();
        let key = path_key(path);
        debug!(file = %key, "Scanning file for marks");

        if !self.liveness.is_alive() {
            return self.abort(report, "before reading the file");
        }

        let filter = self.filter.read().clone();
        let eligible = self.files.contains(path) && filter.should_scan_path(path, self.files.is_directory(path));

        let mut extracted = BTreeMap::new();
        if eligible {
            match self.text.last_modified(path) {
                Ok(modified) => {
                    match self.extract_all(vec![(path.to_path_buf(), key.clone(), modified)], &mut report) {
                        Ok(read) => extracted = read,
                        Err(_) => return self.abort(report, "while reading the file"),
                    }
                }
                Err(e) if e.is_fatal() => return self.abort(report, "while reading the file"),
                Err(e) => {
                    debug!(file = %key, "File not readable: {}", e);
                    report.files_failed += 1;
                }
            }
        }

        if !self.liveness.is_alive() {
            return self.abort(report, "after extraction");
        }

        let tracked = match self.tracked_markers(|marker| marker.file == key) {
            Ok(tracked) => tracked,
            Err(e) if e.is_fatal() => return self.abort(report, "while listing markers"),
            Err(e) => {
                error!(file = %key, "Failed to list tracked markers: {}", e);
                return self.finish(report, start);
            }
        };

        let plan = match self.plan(&extracted, &tracked, &filter) {
            Ok(plan) => plan,
            Err(_) => return self.abort(report, "while validating markers"),
        };
        if !self.apply(plan, &extracted, &mut report) {
            return self.abort(report, "before applying changes");
        }

        if !eligible {
            self.scan_state.remove(&key);
        }

        self.finish(report, start)
    }

    fn eligible_files(&self, filter: &FileFilter) -> crate::Result<Vec<PathBuf>> {
        let listed = match self.files.list_files() {
            Some(Ok(files)) => files,
            Some(Err(e)) => {
                warn!("Indexed file listing failed, walking the tree instead: {}", e);
                self.walk(filter)?
            }
            None => self.walk(filter)?,
        };

        let mut eligible: Vec<PathBuf> = listed
            .into_iter()
            .filter(|path| self.files.contains(path) && filter.should_scan_path(path, false))
            .collect();
        eligible.sort();
        eligible.dedup();
        Ok(eligible)
    }

    fn walk(&self, filter: &FileFilter) -> crate::Result<Vec<PathBuf>> {
        let mut stack = self.files.list_content_roots()?;
        let mut found = Vec::new();

        while let Some(dir) = stack.pop() {
            self.liveness.ensure_alive()?;
            let children = match self.files.list_children(&dir) {
                Ok(children) => children,
                Err(e) => {
                    warn!("Cannot list {}: {}", dir.display(), e);
                    continue;
                }
            };
            for child in children {
                if child.is_directory {
                    stack.push(child.path);
                } else if filter.should_scan_path(&child.path, false) {
                    found.push(child.path);
                }
            }
        }

        Ok(found)
    }

    fn extract_all(
        &self,
        pending: Vec<(PathBuf, String, i64)>,
        report: &mut ScanReport,
    ) -> crate::Result<BTreeMap<String, ExtractedFile>> {
        let extract = |(path, key, modified): (PathBuf, String, i64)| -> crate::Result<Option<ExtractedFile>> {
            self.liveness.ensure_alive()?;
            match self.text.read_text(&path) {
                Ok(text) => {
                    let candidates = self.candidates(&key, &text);
                    Ok(Some(ExtractedFile {
                        key,
                        modified,
                        text,
                        candidates,
                    }))
                }
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    Ok(None)
                }
            }
        };

        let attempted = pending.len();
        let results: Vec<crate::Result<Option<ExtractedFile>>> = if self.parallel && pending.len() > 1 {
            pending.into_par_iter().map(extract).collect()
        } else {
            pending.into_iter().map(extract).collect()
        };

        let mut files = BTreeMap::new();
        for result in results {
            if let Some(file) = result? {
                files.insert(file.key.clone(), file);
            }
        }

        report.files_scanned += files.len();
        report.files_failed += attempted - files.len();
        report.marks_found += files.values().map(|file| file.candidates.len()).sum::<usize>();
        Ok(files)
    }

    fn candidates(&self, key: &str, text: &str) -> Vec<MarkCandidate> {
        self.matcher
            .extract(text)
            .into_iter()
            .map(|found| {
                debug!(file = %key, line = found.line, label = %found.label, "Found mark");
                MarkCandidate {
                    file: key.to_string(),
                    line: found.line,
                    label: found.label,
                    tag: found.tag,
                }
            })
            .collect()
    }

    fn tracked_markers(&self, in_scope: impl Fn(&TrackedMarker) -> bool) -> crate::Result<Vec<TrackedMarker>> {
        let base = self.reconciler.base_group();
        Ok(self
            .store
            .list_markers(base)?
            .into_iter()
            .filter(|marker| is_managed_group(&marker.group, base) && in_scope(marker))
            .collect())
    }

    fn plan(
        &self,
        extracted: &BTreeMap<String, ExtractedFile>,
        tracked: &[TrackedMarker],
        filter: &FileFilter,
    ) -> crate::Result<ReconcilePlan> {
        let mut validator = Validator::new(self.text.as_ref(), self.files.as_ref(), filter);
        let mut candidates = BTreeMap::new();
        for (key, file) in extracted {
            validator.seed(key.clone(), &file.text);
            candidates.insert(key.clone(), file.candidates.clone());
        }
        self.reconciler.reconcile(&candidates, tracked, &validator)
    }

    /// Applies the plan and records scan state. `false` if the workspace
    /// closed first.
    fn apply(
        &self,
        plan: ReconcilePlan,
        extracted: &BTreeMap<String, ExtractedFile>,
        report: &mut ScanReport,
    ) -> bool {
        report.kept += plan.kept;
        let batch = plan.into_batch();

        let mut unsettled: HashSet<String> = HashSet::new();
        if !batch.is_empty() {
            if !self.liveness.is_alive() {
                return false;
            }
            info!(
                add = batch.additions.len(),
                remove = batch.removals.len(),
                "Applying marker changes"
            );
            let outcome = self.store.apply_batch(&batch, &self.liveness);
            report.added += outcome.added.len();
            report.removed += outcome.removed;
            report.store_failures += outcome.failures;
            if outcome.aborted {
                return false;
            }
            if outcome.failures > 0 {
                // Rescan these files next time so the failed mutations are retried.
                unsettled.extend(batch.removals.iter().map(|marker| marker.file.clone()));
                unsettled.extend(batch.additions.iter().map(|marker| marker.file.clone()));
            }
        }

        for (key, file) in extracted {
            if unsettled.contains(key) {
                self.scan_state.remove(key);
            } else {
                self.scan_state.set(key.clone(), file.modified);
            }
        }
        true
    }

    fn abort(&self, mut report: ScanReport, stage: &str) -> ScanReport {
        warn!("Workspace closed, abandoning scan {}", stage);
        report.aborted = true;
        self.passes.fetch_add(1, Ordering::AcqRel);
        report
    }

    fn finish(&self, mut report: ScanReport, start: Instant) -> ScanReport {
        report.duration_ms = start.elapsed().as_millis() as u64;
        self.passes.fetch_add(1, Ordering::AcqRel);
        info!(
            scanned = report.files_scanned,
            skipped = report.files_skipped,
            failed = report.files_failed,
            added = report.added,
            removed = report.removed,
            kept = report.kept,
            duration_ms = report.duration_ms,
            "Scan completed"
        );
        report
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
