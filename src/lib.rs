pub mod types;
pub mod error;
pub mod config;
pub mod matcher;
pub mod filter;
pub mod scan_state;
pub mod reconciler;
pub mod orchestrator;
pub mod scheduler;
pub mod groups;
pub mod host;
pub mod storage;
pub mod cli;
pub mod cli_types;

// Re-export commonly used types
pub use types::*;
pub use error::{CodeMarksError, Result};
pub use config::CodeMarksConfig;
pub use matcher::{MarkMatch, PatternMatcher};
pub use filter::FileFilter;
pub use scan_state::ScanState;
pub use reconciler::{ReconcilePlan, Reconciler, Validator};
pub use orchestrator::{ScanOrchestrator, ScanReport, ScanRequest};
pub use scheduler::Scheduler;
pub use groups::{organize_groups, MarkerGroup};
pub use host::{FileEnumerator, InMemoryWorkspace, Liveness, LocalFileSystem, MarkerStore, TextAccessor};
pub use storage::{InMemoryMarkerStore, Snapshot};
pub use cli::CliApp;
