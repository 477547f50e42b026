use serde::{Deserialize, Serialize};
use std::fmt;

/// Group name every marker managed by this crate lives under, unless
/// configured otherwise.
pub const DEFAULT_BASE_GROUP: &str = "CodeMarks";

/// A mark comment found in a file during the current scan.
///
/// Line numbers are zero-based and only meaningful for the scan that produced
/// them; they are never patched incrementally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkCandidate {
    pub file: String,
    pub line: usize,
    pub label: String,
    pub tag: Option<String>,
}

impl MarkCandidate {
    pub fn new(file: impl Into<String>, line: usize, label: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            label: label.into(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn group_name(&self, base_group: &str) -> String {
        group_name(base_group, self.tag.as_deref())
    }
}

/// Identifier handed out by a marker store for each marker it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A marker as held by the marker store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedMarker {
    pub id: MarkerId,
    pub file: String,
    pub line: usize,
    pub label: String,
    pub group: String,
}

impl TrackedMarker {
    /// Whether this marker sits at the same place, with the same text and
    /// group, as `marker`.
    pub fn matches(&self, marker: &NewMarker) -> bool {
        self.file == marker.file
            && self.line == marker.line
            && self.label == marker.label
            && self.group == marker.group
    }
}

/// A marker the reconciler wants created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewMarker {
    pub file: String,
    pub line: usize,
    pub label: String,
    pub group: String,
}

impl NewMarker {
    pub fn from_candidate(candidate: &MarkCandidate, base_group: &str) -> Self {
        Self {
            file: candidate.file.clone(),
            line: candidate.line,
            label: candidate.label.clone(),
            group: candidate.group_name(base_group),
        }
    }
}

/// `base` for untagged marks, `"base tag"` for tagged ones.
pub fn group_name(base_group: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{} {}", base_group, tag),
        None => base_group.to_string(),
    }
}

/// Whether `group` is the base group itself or one of its tagged groups.
pub fn is_managed_group(group: &str, base_group: &str) -> bool {
    match group.strip_prefix(base_group) {
        Some("") => true,
        Some(rest) => rest.starts_with(' ') && rest.len() > 1,
        None => false,
    }
}
