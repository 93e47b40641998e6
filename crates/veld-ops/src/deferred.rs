//! Deferred actions: queue now, run later in one go.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use veld_core::{Panel, PathEntry, ViewId};

use crate::fs::{FileSystem, path_exists};
use crate::immediate::remove_entry;
use crate::operation::{OpError, OperationError, OperationKind};
use crate::outcome::{ActionReport, ItemOutcome};
use crate::refresh::RefreshBroadcaster;

/// One queued operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredAction {
    /// Remove `target` (recursively for directories).
    Delete { target: PathEntry },
    /// Copy `target` to exactly `destination`.
    Copy {
        target: PathEntry,
        destination: PathBuf,
    },
}

impl DeferredAction {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Delete { .. } => OperationKind::Delete,
            Self::Copy { .. } => OperationKind::Copy,
        }
    }

    pub fn target(&self) -> &PathEntry {
        match self {
            Self::Delete { target } | Self::Copy { target, .. } => target,
        }
    }

    pub fn destination(&self) -> Option<&Path> {
        match self {
            Self::Delete { .. } => None,
            Self::Copy { destination, .. } => Some(destination),
        }
    }

    /// The line shown in the visible log, e.g. `delete: notes.txt`.
    pub fn log_line(&self) -> String {
        let verb = match self {
            Self::Delete { .. } => "delete",
            Self::Copy { .. } => "copy",
        };
        format!("{verb}: {}", self.target().display_name())
    }

    /// The directory whose listing this action changes.
    fn changed_dir(&self) -> Option<&Path> {
        match self {
            Self::Delete { target } => target.parent(),
            Self::Copy { destination, .. } => destination.parent(),
        }
    }

    /// Perform the action. Returns the path that was removed or written.
    pub fn apply(&self, fs: &dyn FileSystem, use_trash: bool) -> Result<PathBuf, OpError> {
        match self {
            Self::Delete { target } => {
                remove_entry(fs, target, use_trash)?;
                Ok(target.path().to_path_buf())
            }
            Self::Copy {
                target,
                destination,
            } => {
                if path_exists(destination) {
                    return Err(OpError::AlreadyExists {
                        path: destination.clone(),
                    });
                }
                // Resolve links and `..` in the parent; the copy itself does not exist yet.
                let landing = destination
                    .parent()
                    .and_then(|dir| std::fs::canonicalize(dir).ok())
                    .unwrap_or_else(|| destination.clone());
                if target.is_dir() && landing.starts_with(target.canonical()) {
                    return Err(OpError::SourceIsAncestor {
                        path: target.path().to_path_buf(),
                    });
                }
                fs.copy(target.path(), destination)
                    .map_err(|e| OpError::io(target.path(), e))?;
                Ok(destination.clone())
            }
        }
    }
}

/// FIFO log of deferred actions.
#[derive(Debug, Clone, Default)]
pub struct DeferredActionLog {
    entries: VecDeque<DeferredAction>,
    origin: Option<ViewId>,
    use_trash: bool,
    broadcaster: RefreshBroadcaster,
}

impl DeferredActionLog {
    pub fn new(use_trash: bool) -> Self {
        Self {
            use_trash,
            ..Self::default()
        }
    }

    pub fn enqueue(&mut self, action: DeferredAction) {
        tracing::debug!(action = %action.log_line(), "Queued deferred action");
        self.entries.push_back(action);
    }

    /// Queue one action per entry selected in `panel`, then clear its selection.
    ///
    /// `destination` is the directory copies go into. Moves cannot be deferred.
    pub fn queue_selection(
        &mut self,
        panel: &mut Panel,
        kind: OperationKind,
        destination: Option<&Path>,
    ) -> Result<usize, OpError> {
        let selected = panel.selection().snapshot();
        if selected.is_empty() {
            return Ok(0);
        }

        let actions: Vec<DeferredAction> = match kind {
            OperationKind::Delete => selected
                .into_iter()
                .map(|target| DeferredAction::Delete { target })
                .collect(),
            OperationKind::Copy => {
                let dir = destination
                    .filter(|dir| dir.is_dir())
                    .ok_or_else(|| OpError::not_a_directory(destination.unwrap_or(Path::new(""))))?;
                selected
                    .into_iter()
                    .map(|target| DeferredAction::Copy {
                        destination: dir.join(target.name()),
                        target,
                    })
                    .collect()
            }
            OperationKind::Move => {
                return Err(OpError::configuration(
                    "Move is not supported for deferred actions",
                ));
            }
            OperationKind::Rename | OperationKind::CreateDirectory => {
                return Err(OpError::configuration(format!("{kind} cannot be deferred")));
            }
        };

        let count = actions.len();
        for action in actions {
            self.enqueue(action);
        }
        self.origin = Some(panel.id());
        panel.selection_mut().clear();
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeferredAction> {
        self.entries.iter()
    }

    /// The visible log, one line per queued action.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(DeferredAction::log_line).collect()
    }

    /// Discard every queued action without touching the filesystem.
    pub fn clear(&mut self) {
        tracing::debug!(discarded = self.entries.len(), "Cleared deferred actions");
        self.entries.clear();
        self.origin = None;
    }

    /// Run every queued action in order, then refresh the affected views.
    ///
    /// A failing action is reported and the rest still run. The originating
    /// view's selection is cleared afterwards.
    pub fn execute_all(&mut self, fs: &dyn FileSystem, panels: &mut [Panel]) -> ActionReport {
        let mut report = ActionReport::default();

        while let Some(action) = self.entries.pop_front() {
            let kind = action.kind();
            let outcome = match action.apply(fs, self.use_trash) {
                Ok(target) => ItemOutcome::Applied {
                    kind,
                    source: action.target().clone(),
                    target,
                },
                Err(e) => {
                    tracing::warn!(action = %action.log_line(), error = %e, "Deferred action failed");
                    ItemOutcome::Failed {
                        kind,
                        source: action.target().clone(),
                        error: OperationError::from_error(action.target().path(), &e),
                    }
                }
            };
            report.push(outcome, action.changed_dir());
        }

        report.reloaded = self.broadcaster.finish(
            panels,
            self.origin.take(),
            report.touched_dirs.iter().map(PathBuf::as_path),
        );

        tracing::info!(
            actions = report.outcomes.len(),
            failed = report.failed(),
            "Deferred actions executed"
        );
        report
    }
}
