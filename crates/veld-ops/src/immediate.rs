//! Actions applied as soon as they are confirmed: delete, rename, new directory.

use std::ffi::OsStr;
use std::path::{Component, Path};

use veld_core::{Panel, PathEntry, ViewId};

use crate::fs::{FileSystem, path_exists};
use crate::operation::{OpError, OperationError, OperationKind};
use crate::outcome::{ActionReport, ItemOutcome};
use crate::refresh::RefreshBroadcaster;

/// Question asked before deleting `count` selected entries.
pub fn delete_prompt(count: usize) -> String {
    format!("Delete {count} items? (y/n)")
}

/// Whether an answer to a y/n prompt means yes.
pub fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Remove (or trash) one entry.
pub(crate) fn remove_entry(
    fs: &dyn FileSystem,
    target: &PathEntry,
    use_trash: bool,
) -> Result<(), OpError> {
    let path = target.path();
    let result = if use_trash {
        fs.trash(path)
    } else {
        fs.remove(path)
    };
    result.map_err(|e| OpError::io(path, e))
}

/// Delete everything selected in the view `origin`.
///
/// Each entry is reported on its own; a failure does not stop the rest. The
/// selection is cleared and views showing a parent directory reload.
pub fn delete_selection(
    fs: &dyn FileSystem,
    panels: &mut [Panel],
    origin: ViewId,
    use_trash: bool,
) -> ActionReport {
    let mut report = ActionReport::default();
    let selected = panels
        .iter()
        .find(|p| p.id() == origin)
        .map(|p| p.selection().snapshot())
        .unwrap_or_default();

    for target in selected {
        let outcome = match remove_entry(fs, &target, use_trash) {
            Ok(()) => ItemOutcome::Applied {
                kind: OperationKind::Delete,
                target: target.path().to_path_buf(),
                source: target.clone(),
            },
            Err(e) => {
                tracing::warn!(path = %target.path().display(), error = %e, "Delete failed");
                ItemOutcome::Failed {
                    kind: OperationKind::Delete,
                    error: OperationError::from_error(target.path(), &e),
                    source: target.clone(),
                }
            }
        };
        report.push(outcome, target.parent());
    }

    settle(&mut report, panels, Some(origin));
    tracing::info!(
        deleted = report.outcomes.len() - report.failed(),
        failed = report.failed(),
        "Deleted selection"
    );
    report
}

/// Give `entry` a new name in the same directory.
///
/// Refuses names that already exist or that are not a single path component.
pub fn rename_entry(
    fs: &dyn FileSystem,
    panels: &mut [Panel],
    entry: &PathEntry,
    new_name: &str,
) -> ActionReport {
    let mut report = ActionReport::default();
    let result = single_component(new_name).and_then(|name| {
        let target = match entry.parent() {
            Some(dir) => dir.join(name),
            None => return Err(OpError::configuration("Cannot rename a filesystem root")),
        };
        if path_exists(&target) {
            return Err(OpError::AlreadyExists { path: target });
        }
        fs.rename(entry.path(), &target)
            .map_err(|e| OpError::io(entry.path(), e))?;
        Ok(target)
    });

    let outcome = match result {
        Ok(target) => ItemOutcome::Applied {
            kind: OperationKind::Rename,
            source: entry.clone(),
            target,
        },
        Err(e) => ItemOutcome::Failed {
            kind: OperationKind::Rename,
            source: entry.clone(),
            error: OperationError::from_error(entry.path(), &e),
        },
    };
    report.push(outcome, entry.parent());
    settle(&mut report, panels, None);
    report
}

/// Create a directory called `name` inside `parent`.
pub fn create_directory(
    fs: &dyn FileSystem,
    panels: &mut [Panel],
    parent: &Path,
    name: &str,
) -> ActionReport {
    let mut report = ActionReport::default();
    let new_dir = PathEntry::from_parts(parent.join(name.trim()), true);
    let result = single_component(name).and_then(|_| {
        fs.create_dir(new_dir.path())
            .map_err(|e| OpError::io(new_dir.path(), e))
    });

    let outcome = match result {
        Ok(()) => ItemOutcome::Applied {
            kind: OperationKind::CreateDirectory,
            target: new_dir.path().to_path_buf(),
            source: new_dir.clone(),
        },
        Err(e) => ItemOutcome::Failed {
            kind: OperationKind::CreateDirectory,
            error: OperationError::from_error(new_dir.path(), &e),
            source: new_dir.clone(),
        },
    };
    report.push(outcome, Some(parent));
    settle(&mut report, panels, None);
    report
}

/// A user-typed name that must stay in its directory.
fn single_component(name: &str) -> Result<&OsStr, OpError> {
    let name = name.trim();
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(part),
        _ => Err(OpError::configuration(format!("'{name}' is not a valid name"))),
    }
}

fn settle(report: &mut ActionReport, panels: &mut [Panel], origin: Option<ViewId>) {
    report.reloaded = RefreshBroadcaster.finish(
        panels,
        origin,
        report.touched_dirs.iter().map(|p| p.as_path()),
    );
}
