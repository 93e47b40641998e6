//! Per-view selection sets.

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::entry::PathEntry;

/// Entries selected in one view, unique by canonical path.
///
/// Iteration follows insertion order so that batches built from a selection
/// process items in the order the user picked them.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    entries: IndexMap<PathBuf, PathEntry>,
}

impl SelectionSet {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle an entry in or out of the selection.
    ///
    /// Returns `true` if the entry is selected afterwards.
    pub fn toggle(&mut self, entry: PathEntry) -> bool {
        let key = entry.canonical();
        if self.entries.shift_remove(&key).is_some() {
            false
        } else {
            self.entries.insert(key, entry);
            true
        }
    }

    /// Select an entry, leaving it selected if it already was.
    ///
    /// Returns `true` if the entry was newly added.
    pub fn insert(&mut self, entry: PathEntry) -> bool {
        let key = entry.canonical();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    /// Check whether an entry is selected.
    pub fn contains(&self, entry: &PathEntry) -> bool {
        self.entries.contains_key(&entry.canonical())
    }

    /// Number of selected entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deselect everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over the selected entries.
    pub fn iter(&self) -> impl Iterator<Item = &PathEntry> {
        self.entries.values()
    }

    /// Immutable copy of the selection, for handing to a worker.
    pub fn snapshot(&self) -> Vec<PathEntry> {
        self.entries.values().cloned().collect()
    }

    /// Paths of the selected entries.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries
            .values()
            .map(|e| e.path().to_path_buf())
            .collect()
    }
}
