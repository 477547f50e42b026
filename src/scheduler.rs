//! Debounced scan requests driven by change notifications.
//!
//! Every notification re-arms a single timer. When it finally fires, one scan
//! runs for everything requested since the last one: a single-file scan if
//! only one file was named, otherwise a whole-workspace scan.

use crate::error::{CodeMarksError, Result};
use crate::orchestrator::{ScanOrchestrator, ScanReport, ScanRequest};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanTarget {
    File(PathBuf),
    Workspace,
}

impl ScanTarget {
    fn merge(self, other: ScanTarget) -> ScanTarget {
        match (self, other) {
            (ScanTarget::File(a), ScanTarget::File(b)) if a == b => ScanTarget::File(a),
            _ => ScanTarget::Workspace,
        }
    }

    fn into_request(self) -> ScanRequest {
        match self {
            ScanTarget::File(path) => ScanRequest::File(path),
            ScanTarget::Workspace => ScanRequest::Workspace,
        }
    }
}

#[derive(Default)]
struct PendingScan {
    target: Option<ScanTarget>,
    /// Bumped on every re-arm; a timer only fires if it is still current.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

pub struct Scheduler {
    orchestrator: Arc<ScanOrchestrator>,
    debounce: Duration,
    runtime: Handle,
    pending: Arc<Mutex<PendingScan>>,
    reports: broadcast::Sender<ScanReport>,
}

impl Scheduler {
    /// Must be called from within a tokio runtime.
    pub fn new(orchestrator: Arc<ScanOrchestrator>, debounce: Duration) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| CodeMarksError::CollaboratorUnavailable(format!("no async runtime: {}", e)))?;
        let (reports, _) = broadcast::channel(16);
        Ok(Self {
            orchestrator,
            debounce,
            runtime,
            pending: Arc::new(Mutex::new(PendingScan::default())),
            reports,
        })
    }

    pub fn orchestrator(&self) -> &Arc<ScanOrchestrator> {
        &self.orchestrator
    }

    /// Reports of scans this scheduler ran.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanReport> {
        self.reports.subscribe()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().target.is_some()
    }

    /// Returns whether a scan was scheduled.
    pub fn notify_file(&self, path: &Path) -> bool {
        if !self.orchestrator.is_eligible(path) {
            debug!(file = %path.display(), "Ignoring change to ineligible file");
            return false;
        }
        self.schedule(ScanTarget::File(path.to_path_buf()));
        true
    }

    /// Bulk notification, e.g. after a VCS update touched many files.
    pub fn notify_files<I, P>(&self, paths: I) -> bool
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut eligible: Vec<PathBuf> = paths
            .into_iter()
            .filter(|path| self.orchestrator.is_eligible(path.as_ref()))
            .map(|path| path.as_ref().to_path_buf())
            .collect();
        eligible.sort();
        eligible.dedup();

        match eligible.len() {
            0 => false,
            1 => {
                self.schedule(ScanTarget::File(eligible.remove(0)));
                true
            }
            count => {
                debug!(count, "Several files changed, scheduling a workspace scan");
                self.schedule(ScanTarget::Workspace);
                true
            }
        }
    }

    pub fn request_full_scan(&self) {
        self.schedule(ScanTarget::Workspace);
    }

    /// Drops any pending scan and marks the workspace closed, so a scan
    /// already running stops before its next store mutation.
    pub fn shutdown(&self) {
        info!("Shutting down scan scheduler");
        self.orchestrator.liveness().close();
        let mut pending = self.pending.lock();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.target = None;
        pending.generation += 1;
    }

    fn schedule(&self, target: ScanTarget) {
        if !self.orchestrator.liveness().is_alive() {
            return;
        }

        let mut pending = self.pending.lock();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.generation += 1;
        pending.target = Some(match pending.target.take() {
            Some(previous) => previous.merge(target),
            None => target,
        });

        let generation = pending.generation;
        let slot = Arc::clone(&self.pending);
        let orchestrator = Arc::clone(&self.orchestrator);
        let reports = self.reports.clone();
        let debounce = self.debounce;

        pending.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;

            let target = {
                let mut pending = slot.lock();
                if pending.generation != generation {
                    return;
                }
                pending.timer = None;
                pending.target.take()
            };
            let Some(target) = target else {
                return;
            };
            if !orchestrator.liveness().is_alive() {
                return;
            }

            let request = target.into_request();
            debug!(%request, "Debounce elapsed, starting scan");
            match orchestrator.spawn(request).await {
                Ok(report) => {
                    let _ = reports.send(report);
                }
                Err(e) => error!("Scan task failed: {}", e),
            }
        }));
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.pending.lock().timer.take() {
            timer.abort();
        }
    }
}
