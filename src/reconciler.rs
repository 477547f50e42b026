//! Diffing of freshly extracted marks against the markers already tracked.
//!
//! A pass works on one scope (the whole workspace or a single file):
//!
//! 1. every tracked marker in scope is re-validated against the current file
//!    content and dropped if its line no longer carries the same label;
//! 2. every fresh candidate either finds an identical surviving marker (kept)
//!    or becomes an addition, evicting whatever marker still sits on its line;
//! 3. surviving markers in freshly read files that no candidate claimed are
//!    dropped, so tracked markers and candidates end up 1:1.
//!
//! Files that were not re-read this pass (unchanged since the last scan) only
//! go through step 1.

use crate::error::{CodeMarksError, Result};
use crate::filter::FileFilter;
use crate::host::{FileEnumerator, MarkerBatch, TextAccessor};
use crate::matcher::PatternMatcher;
use crate::types::{MarkCandidate, MarkerId, NewMarker, TrackedMarker};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Why a tracked marker failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("file is not part of the workspace")]
    NotInWorkspace,
    #[error("file no longer matches the configured patterns")]
    Filtered,
    #[error("file could not be read: {0}")]
    Unreadable(String),
    /// The host went away; says nothing about the marker itself.
    #[error("workspace unavailable: {0}")]
    Unavailable(String),
    #[error("line {line} is past the end of the file ({line_count} lines)")]
    LineOutOfRange { line: usize, line_count: usize },
    #[error("line no longer carries a mark")]
    NoMark,
    #[error("label changed to '{found}'")]
    LabelChanged { found: String },
}

impl InvalidReason {
    fn from_read_error(error: CodeMarksError) -> Self {
        if error.is_fatal() {
            Self::Unavailable(error.to_string())
        } else {
            Self::Unreadable(error.to_string())
        }
    }
}

/// Re-checks tracked markers against current file content.
///
/// Files whose text was already read this pass can be seeded so validation
/// and extraction see the same content.
pub struct Validator<'a> {
    text: &'a dyn TextAccessor,
    files: &'a dyn FileEnumerator,
    filter: &'a FileFilter,
    matcher: PatternMatcher,
    seeded: HashMap<String, Vec<String>>,
}

impl<'a> Validator<'a> {
    pub fn new(text: &'a dyn TextAccessor, files: &'a dyn FileEnumerator, filter: &'a FileFilter) -> Self {
        Self {
            text,
            files,
            filter,
            matcher: PatternMatcher::new(),
            seeded: HashMap::new(),
        }
    }

    pub fn seed(&mut self, file: impl Into<String>, text: &str) {
        let lines = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        self.seeded.insert(file.into(), lines);
    }

    pub fn validate(&self, marker: &TrackedMarker) -> std::result::Result<(), InvalidReason> {
        let path = Path::new(&marker.file);
        if !self.files.contains(path) {
            return Err(InvalidReason::NotInWorkspace);
        }
        if !self.filter.should_scan_path(path, self.files.is_directory(path)) {
            return Err(InvalidReason::Filtered);
        }

        let line_text = match self.seeded.get(&marker.file) {
            Some(lines) => {
                if marker.line >= lines.len() {
                    return Err(InvalidReason::LineOutOfRange {
                        line: marker.line,
                        line_count: lines.len(),
                    });
                }
                lines[marker.line].clone()
            }
            None => {
                let line_count = self
                    .text
                    .line_count(path)
                    .map_err(InvalidReason::from_read_error)?;
                if marker.line >= line_count {
                    return Err(InvalidReason::LineOutOfRange {
                        line: marker.line,
                        line_count,
                    });
                }
                self.text
                    .line_text(path, marker.line)
                    .map_err(InvalidReason::from_read_error)?
                    .ok_or(InvalidReason::LineOutOfRange {
                        line: marker.line,
                        line_count,
                    })?
            }
        };

        match self.matcher.match_line(&line_text) {
            None => Err(InvalidReason::NoMark),
            Some(found) if found.label != marker.label => {
                Err(InvalidReason::LabelChanged { found: found.label })
            }
            Some(_) => Ok(()),
        }
    }
}

/// Result of one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub to_add: Vec<NewMarker>,
    pub to_remove: Vec<TrackedMarker>,
    pub kept: usize,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn into_batch(self) -> MarkerBatch {
        MarkerBatch {
            removals: self.to_remove,
            additions: self.to_add,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    base_group: String,
}

impl Reconciler {
    pub fn new(base_group: impl Into<String>) -> Self {
        Self {
            base_group: base_group.into(),
        }
    }

    pub fn base_group(&self) -> &str {
        &self.base_group
    }

    /// `extracted` holds the fresh candidates of every file read this pass
    /// (possibly empty); `tracked` is every tracked marker in scope.
    ///
    /// Fails only if the host disappears while markers are validated; no
    /// partial plan is returned then.
    pub fn reconcile(
        &self,
        extracted: &BTreeMap<String, Vec<MarkCandidate>>,
        tracked: &[TrackedMarker],
        validator: &Validator<'_>,
    ) -> Result<ReconcilePlan> {
        let mut plan = ReconcilePlan::default();
        let mut resolved: HashSet<MarkerId> = HashSet::new();

        // Step 1: validation.
        let mut occupants: HashMap<(&str, usize), Vec<&TrackedMarker>> = HashMap::new();
        let mut survivors = Vec::new();
        for marker in tracked {
            match validator.validate(marker) {
                Ok(()) => {
                    occupants
                        .entry((marker.file.as_str(), marker.line))
                        .or_default()
                        .push(marker);
                    survivors.push(marker);
                }
                Err(InvalidReason::Unavailable(cause)) => {
                    return Err(CodeMarksError::CollaboratorUnavailable(cause));
                }
                Err(reason) => {
                    debug!(file = %marker.file, line = marker.line, label = %marker.label, "Dropping marker: {}", reason);
                    resolved.insert(marker.id);
                    plan.to_remove.push(marker.clone());
                }
            }
        }

        // Step 2: match candidates, first candidate per line wins.
        for (file, candidates) in extracted {
            let mut seen_lines = HashSet::new();
            for candidate in candidates {
                if !seen_lines.insert(candidate.line) {
                    debug!(file = %file, line = candidate.line, "Ignoring second mark on the same line");
                    continue;
                }

                let wanted = NewMarker::from_candidate(candidate, &self.base_group);
                let at_line: Vec<&TrackedMarker> = occupants
                    .get(&(candidate.file.as_str(), candidate.line))
                    .map(|markers| {
                        markers
                            .iter()
                            .copied()
                            .filter(|marker| !resolved.contains(&marker.id))
                            .collect()
                    })
                    .unwrap_or_default();

                if let Some(keeper) = at_line.iter().find(|marker| marker.matches(&wanted)) {
                    resolved.insert(keeper.id);
                    plan.kept += 1;
                    continue;
                }

                for displaced in at_line {
                    debug!(file = %displaced.file, line = displaced.line, from = %displaced.group, to = %wanted.group, "Replacing marker");
                    resolved.insert(displaced.id);
                    plan.to_remove.push(displaced.clone());
                }
                plan.to_add.push(wanted);
            }
        }

        // Step 3: leftovers in re-read files have no candidate any more.
        for marker in survivors {
            if extracted.contains_key(&marker.file) && resolved.insert(marker.id) {
                debug!(file = %marker.file, line = marker.line, "Dropping unmatched marker");
                plan.to_remove.push(marker.clone());
            }
        }

        Ok(plan)
    }
}
