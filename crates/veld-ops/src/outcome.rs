//! Per-item outcomes and batch reports.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use veld_core::{Notification, PathEntry};

use crate::operation::{BatchKind, OperationError, OperationKind};

/// Why an item was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The user answered a conflict with Skip.
    UserChoice,
    /// Source and target are the same entry.
    SameFile,
}

/// What happened to a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item landed at `target` (for deletions, `target` is what was removed).
    Applied {
        kind: OperationKind,
        source: PathEntry,
        target: PathBuf,
    },
    /// The item was dropped without touching the filesystem.
    Skipped {
        kind: OperationKind,
        source: PathEntry,
        reason: SkipReason,
    },
    /// Applying the item failed; the rest of the batch carries on.
    Failed {
        kind: OperationKind,
        source: PathEntry,
        error: OperationError,
    },
}

impl ItemOutcome {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Applied { kind, .. } | Self::Skipped { kind, .. } | Self::Failed { kind, .. } => {
                *kind
            }
        }
    }

    pub fn source(&self) -> &PathEntry {
        match self {
            Self::Applied { source, .. }
            | Self::Skipped { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// The one notification this outcome produces.
    pub fn notification(&self) -> Notification {
        match self {
            Self::Applied {
                kind: OperationKind::Delete,
                source,
                ..
            } => Notification::info(format!("Deleted {}", source.display_name())),
            Self::Applied {
                kind: OperationKind::CreateDirectory,
                source,
                ..
            } => Notification::info(format!("Created directory '{}'", source.display_name())),
            Self::Applied {
                kind,
                source,
                target,
            } => Notification::info(format!(
                "{} {} to {}",
                kind.past_tense(),
                source.display_name(),
                target.display()
            )),
            Self::Skipped {
                source,
                reason: SkipReason::UserChoice,
                ..
            } => Notification::warning(format!("Skipped {}", source.display_name())),
            Self::Skipped {
                source,
                reason: SkipReason::SameFile,
                ..
            } => Notification::warning(format!(
                "Skipped {}: source and destination are the same",
                source.display_name()
            )),
            Self::Failed {
                kind,
                source,
                error,
            } => Notification::error(format!(
                "Error {} {}: {}",
                kind.gerund(),
                source.display_name(),
                error.message
            )),
        }
    }
}

/// Outcomes of actions applied outside a batch queue, with the views they refreshed.
#[derive(Debug, Clone, Default)]
pub struct ActionReport {
    /// One outcome per action, in execution order.
    pub outcomes: Vec<ItemOutcome>,
    /// Directories whose listing changed.
    pub touched_dirs: BTreeSet<PathBuf>,
    /// Number of views reloaded.
    pub reloaded: usize,
}

impl ActionReport {
    pub fn notifications(&self) -> impl Iterator<Item = Notification> + '_ {
        self.outcomes.iter().map(ItemOutcome::notification)
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub(crate) fn push(&mut self, outcome: ItemOutcome, changed_dir: Option<&Path>) {
        if outcome.is_applied() {
            if let Some(dir) = changed_dir {
                self.touched_dirs.insert(dir.to_path_buf());
            }
        }
        self.outcomes.push(outcome);
    }
}

/// Summary of a finished (or abandoned) batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// The kind of batch.
    pub kind: BatchKind,
    /// The destination directory.
    pub destination: PathBuf,
    /// Number of items placed.
    pub applied: usize,
    /// Number of items skipped.
    pub skipped: usize,
    /// Number of items that failed.
    pub failed: usize,
    /// Items never processed because the batch was cancelled.
    pub remaining: usize,
    /// Whether the batch stopped before draining.
    pub cancelled: bool,
    /// Errors that occurred.
    pub errors: Vec<OperationError>,
    touched_dirs: BTreeSet<PathBuf>,
}

impl BatchReport {
    /// Start a report; the destination always counts as touched.
    pub fn new(kind: BatchKind, destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        let mut touched_dirs = BTreeSet::new();
        touched_dirs.insert(destination.clone());
        Self {
            kind,
            destination,
            applied: 0,
            skipped: 0,
            failed: 0,
            remaining: 0,
            cancelled: false,
            errors: Vec::new(),
            touched_dirs,
        }
    }

    /// Report for a batch whose worker died without handing the queue back.
    pub fn interrupted(kind: BatchKind, destination: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        let mut report = Self::new(kind, destination);
        report.cancelled = true;
        report
            .errors
            .push(OperationError::new(report.destination.clone(), message));
        report
    }

    /// Count an outcome and remember which directories it changed.
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Applied { kind, source, .. } => {
                self.applied += 1;
                if *kind == OperationKind::Move {
                    if let Some(parent) = source.parent() {
                        self.touched_dirs.insert(parent.to_path_buf());
                    }
                }
            }
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Failed { error, .. } => {
                self.failed += 1;
                self.errors.push(error.clone());
            }
        }
    }

    /// Distinct directories whose listing changed, each exactly once.
    pub fn touched_dirs(&self) -> impl Iterator<Item = &Path> {
        self.touched_dirs.iter().map(PathBuf::as_path)
    }

    /// Check if every item was placed or deliberately skipped.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }

    /// Get a human-readable summary of the batch.
    pub fn summary(&self) -> String {
        let action = OperationKind::from(self.kind).past_tense();
        let mut summary = format!("{} {} items", action, self.applied);
        if self.skipped > 0 {
            summary.push_str(&format!(", {} skipped", self.skipped));
        }
        if self.failed > 0 {
            summary.push_str(&format!(", {} failed", self.failed));
        }
        if self.cancelled {
            summary.push_str(&format!(", cancelled with {} left", self.remaining));
        }
        summary
    }

    /// The single "batch complete" notification.
    pub fn notification(&self) -> Notification {
        let message = format!("{} operation complete: {}", self.kind, self.summary());
        if self.failed > 0 {
            Notification::error(message)
        } else if self.cancelled {
            Notification::warning(message)
        } else {
            Notification::info(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use veld_core::Severity;

    use super::*;

    fn entry(path: &str) -> PathEntry {
        PathEntry::from_parts(path, false)
    }

    #[test]
    fn test_record_move_touches_source_parents_once() {
        let mut report = BatchReport::new(BatchKind::Move, "/dest");
        for path in ["/src/a", "/src/b", "/other/c"] {
            report.record(&ItemOutcome::Applied {
                kind: OperationKind::Move,
                source: entry(path),
                target: PathBuf::from("/dest").join(path.rsplit('/').next().unwrap()),
            });
        }

        let touched: Vec<&Path> = report.touched_dirs().collect();
        assert_eq!(
            touched,
            vec![Path::new("/dest"), Path::new("/other"), Path::new("/src")]
        );
        assert_eq!(report.applied, 3);
    }

    #[test]
    fn test_record_copy_touches_only_destination() {
        let mut report = BatchReport::new(BatchKind::Copy, "/dest");
        report.record(&ItemOutcome::Applied {
            kind: OperationKind::Copy,
            source: entry("/src/a"),
            target: PathBuf::from("/dest/a"),
        });
        assert_eq!(report.touched_dirs().count(), 1);
    }

    #[test]
    fn test_summary_and_severity() {
        let mut report = BatchReport::new(BatchKind::Copy, "/dest");
        report.record(&ItemOutcome::Failed {
            kind: OperationKind::Copy,
            source: entry("/src/a"),
            error: OperationError::new(PathBuf::from("/src/a"), "Permission denied"),
        });
        assert_eq!(report.summary(), "Copied 0 items, 1 failed");
        assert_eq!(report.notification().severity, Severity::Error);
        assert!(!report.is_success());
    }

    #[test]
    fn test_outcome_notifications() {
        let applied = ItemOutcome::Applied {
            kind: OperationKind::Copy,
            source: entry("/src/a.txt"),
            target: PathBuf::from("/dest/a (1).txt"),
        };
        assert_eq!(
            applied.notification().message,
            "Copied a.txt to /dest/a (1).txt"
        );

        let skipped = ItemOutcome::Skipped {
            kind: OperationKind::Move,
            source: entry("/src/a.txt"),
            reason: SkipReason::UserChoice,
        };
        assert_eq!(skipped.notification().message, "Skipped a.txt");
    }
}
