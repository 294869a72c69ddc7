//! Decisions over version listings: what to count, delete, undelete or restore

use crate::bulk::DeleteCandidate;
use crate::listing::VersionEntry;

/// Running totals over a version listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionStats {
    pub versions: usize,
    pub tombstones: usize,
    pub directory_markers: usize,
    pub bytes: i64,
}

impl VersionStats {
    pub fn add(&mut self, entry: &VersionEntry) {
        if entry.is_delete_marker {
            self.tombstones += 1;
        } else {
            self.versions += 1;
            self.bytes += entry.size;
        }
        if entry.is_directory_marker() {
            self.directory_markers += 1;
        }
    }
}

/// Entries `listversions --delete` removes: superseded versions and every delete marker
pub fn is_prunable(entry: &VersionEntry) -> bool {
    entry.is_delete_marker || !entry.is_latest
}

/// Entries `undelete` removes: the latest delete marker of a file.
///
/// Markers on directory keys are left alone.
pub fn is_undeletable(entry: &VersionEntry) -> bool {
    entry.is_delete_marker && entry.is_latest && !entry.is_directory_marker()
}

impl From<&VersionEntry> for DeleteCandidate {
    fn from(entry: &VersionEntry) -> Self {
        DeleteCandidate::new(&entry.key, entry.version_id.clone())
    }
}

/// A version to copy back over a deleted object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreTarget {
    pub key: String,
    pub version_id: String,
}

/// Finds, per key, the newest real version hidden behind a latest delete marker.
///
/// Entries must arrive in listing order: grouped by key, newest first. A key
/// may span page boundaries.
#[derive(Debug, Default)]
pub struct RestorePlanner {
    current_key: Option<String>,
    hidden: bool,
    resolved: bool,
    targets: Vec<RestoreTarget>,
}

impl RestorePlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next entry; `accept` filters which delete markers count
    pub fn observe(&mut self, entry: &VersionEntry, accept: impl Fn(&VersionEntry) -> bool) {
        if self.current_key.as_deref() != Some(entry.key.as_str()) {
            self.current_key = Some(entry.key.clone());
            self.hidden = is_undeletable(entry) && accept(entry);
            self.resolved = false;
            return;
        }

        if self.hidden && !self.resolved && !entry.is_delete_marker {
            if let Some(version_id) = &entry.version_id {
                self.targets.push(RestoreTarget {
                    key: entry.key.clone(),
                    version_id: version_id.clone(),
                });
                self.resolved = true;
            }
        }
    }

    /// Take the targets found so far
    pub fn drain(&mut self) -> Vec<RestoreTarget> {
        std::mem::take(&mut self.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, version: &str, latest: bool, marker: bool) -> VersionEntry {
        VersionEntry {
            key: key.to_string(),
            version_id: Some(version.to_string()),
            size: if marker { 0 } else { 100 },
            last_modified: None,
            is_latest: latest,
            is_delete_marker: marker,
        }
    }

    #[test]
    fn test_stats() {
        let mut stats = VersionStats::default();
        stats.add(&entry("a", "1", true, false));
        stats.add(&entry("a", "0", false, false));
        stats.add(&entry("b", "2", true, true));
        stats.add(&entry("dir/", "3", true, false));
        assert_eq!(stats.versions, 3);
        assert_eq!(stats.tombstones, 1);
        assert_eq!(stats.directory_markers, 1);
        assert_eq!(stats.bytes, 300);
    }

    #[test]
    fn test_undelete_predicate() {
        assert!(is_undeletable(&entry("file", "1", true, true)));
        assert!(!is_undeletable(&entry("dir/", "1", true, true)));
        assert!(!is_undeletable(&entry("file", "1", false, true)));
        assert!(!is_undeletable(&entry("file", "1", true, false)));
    }

    #[test]
    fn test_prunable_predicate() {
        assert!(!is_prunable(&entry("file", "1", true, false)));
        assert!(is_prunable(&entry("file", "0", false, false)));
        assert!(is_prunable(&entry("file", "2", true, true)));
    }

    #[test]
    fn test_restore_planner_with_same_second_delete() {
        use crate::listing::VersionPage;
        use chrono::{TimeZone, Utc};

        let ts = Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let mut old = entry("a", "v1", false, false);
        old.last_modified = ts;
        let mut tombstone = entry("a", "dm", true, true);
        tombstone.last_modified = ts;

        // versions arrive ahead of delete markers from the listing
        let page = VersionPage::new(vec![old, tombstone], false, None);
        let mut planner = RestorePlanner::new();
        for e in &page.entries {
            planner.observe(e, |_| true);
        }

        assert_eq!(
            planner.drain(),
            vec![RestoreTarget { key: "a".into(), version_id: "v1".into() }]
        );
    }

    #[test]
    fn test_restore_planner_across_pages() {
        let mut planner = RestorePlanner::new();
        let page1 = [
            entry("a", "a3", true, true),
            entry("a", "a2", false, true),
        ];
        let page2 = [
            entry("a", "a1", false, false),
            entry("a", "a0", false, false),
            entry("b", "b1", true, false),
            entry("b", "b0", false, false),
            entry("c", "c1", true, true),
            entry("c", "c0", false, false),
            entry("dir/", "d1", true, true),
            entry("dir/", "d0", false, false),
        ];

        for e in &page1 {
            planner.observe(e, |_| true);
        }
        assert!(planner.drain().is_empty());
        for e in &page2 {
            planner.observe(e, |_| true);
        }

        let targets = planner.drain();
        assert_eq!(
            targets,
            vec![
                RestoreTarget { key: "a".into(), version_id: "a1".into() },
                RestoreTarget { key: "c".into(), version_id: "c0".into() },
            ]
        );
    }

    #[test]
    fn test_restore_planner_filter() {
        let mut planner = RestorePlanner::new();
        for e in [entry("a", "a1", true, true), entry("a", "a0", false, false)] {
            planner.observe(&e, |_| false);
        }
        assert!(planner.drain().is_empty());
    }

    #[test]
    fn test_candidate_from_entry() {
        let candidate = DeleteCandidate::from(&entry("k", "v", true, true));
        assert_eq!(candidate, DeleteCandidate::new("k", Some("v".into())));
    }
}
