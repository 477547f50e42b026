use crate::error::Result;
use crate::host::MarkerStore;
use crate::types::{is_managed_group, TrackedMarker};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerGroup {
    pub name: String,
    pub markers: Vec<TrackedMarker>,
}

impl MarkerGroup {
    /// The `[tag]` part of the group name, if any.
    pub fn tag<'a>(&'a self, base_group: &str) -> Option<&'a str> {
        self.name
            .strip_prefix(base_group)
            .and_then(|rest| rest.strip_prefix(' '))
    }
}

/// Managed markers grouped by group name. Groups come out sorted by name and
/// their markers by label; a group with no markers does not appear.
pub fn organize_groups(store: &dyn MarkerStore, base_group: &str) -> Result<Vec<MarkerGroup>> {
    let mut groups: BTreeMap<String, Vec<TrackedMarker>> = BTreeMap::new();
    for marker in store.list_markers(base_group)? {
        if is_managed_group(&marker.group, base_group) {
            groups.entry(marker.group.clone()).or_default().push(marker);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(name, mut markers)| {
            markers.sort_by(|a, b| {
                a.label
                    .cmp(&b.label)
                    .then_with(|| a.file.cmp(&b.file))
                    .then_with(|| a.line.cmp(&b.line))
            });
            MarkerGroup { name, markers }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryMarkerStore;
    use crate::types::NewMarker;

    fn add(store: &InMemoryMarkerStore, file: &str, line: usize, label: &str, group: &str) {
        store
            .add_marker(&NewMarker {
                file: file.into(),
                line,
                label: label.into(),
                group: group.into(),
            })
            .unwrap();
    }

    #[test]
    fn test_groups_sorted_with_sorted_markers() {
        let store = InMemoryMarkerStore::new();
        add(&store, "/a.rs", 3, "zeta", "CodeMarks");
        add(&store, "/a.rs", 1, "alpha", "CodeMarks");
        add(&store, "/b.rs", 0, "todo", "CodeMarks api");
        add(&store, "/b.rs", 9, "other", "Bookmarks");
        add(&store, "/b.rs", 4, "near miss", "CodeMarksX");

        let groups = organize_groups(&store, "CodeMarks").unwrap();

        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["CodeMarks", "CodeMarks api"]);
        let labels: Vec<_> = groups[0].markers.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["alpha", "zeta"]);
        assert_eq!(groups[1].tag("CodeMarks"), Some("api"));
        assert_eq!(groups[0].tag("CodeMarks"), None);
    }

    #[test]
    fn test_empty_store_has_no_groups() {
        let store = InMemoryMarkerStore::new();
        assert!(organize_groups(&store, "CodeMarks").unwrap().is_empty());
    }
}
