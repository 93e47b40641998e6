//! View state the operation engine interacts with.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entry::{PathEntry, normalize};
use crate::selection::SelectionSet;

/// Identifier of an open view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(pub u32);

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// A panel rooted at a directory, owning its selection.
///
/// Rendering lives elsewhere; this is the part the batch machinery needs: a
/// root to match refresh signals against and a selection to clear.
#[derive(Debug, Clone)]
pub struct Panel {
    id: ViewId,
    root: PathBuf,
    selection: SelectionSet,
    generation: u64,
}

impl Panel {
    /// Create a panel rooted at `root`, with `.` and `..` folded away.
    pub fn new(id: ViewId, root: impl AsRef<Path>) -> Self {
        Self {
            id,
            root: normalize(root.as_ref()),
            selection: SelectionSet::new(),
            generation: 0,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionSet {
        &mut self.selection
    }

    /// Toggle an entry in this panel's selection.
    pub fn toggle(&mut self, entry: PathEntry) -> bool {
        self.selection.toggle(entry)
    }

    /// Add an entry to this panel's selection; selecting twice is a no-op.
    pub fn select(&mut self, entry: PathEntry) -> bool {
        self.selection.insert(entry)
    }

    /// Number of times this panel has been reloaded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reload the panel: its listing is stale, so the selection is dropped.
    pub fn reload(&mut self) {
        self.selection.clear();
        self.generation += 1;
    }
}
