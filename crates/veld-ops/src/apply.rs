//! Carrying out a planned placement.

use std::path::Path;

use crate::conflict::{PlaceStrategy, Placement};
use crate::fs::{FileSystem, path_exists};
use crate::operation::{BatchKind, OpError};

impl Placement {
    /// Apply this placement. Either the item fully lands or an error is
    /// returned; the source is never removed before its copy exists.
    pub fn apply(&self, fs: &dyn FileSystem) -> Result<u64, OpError> {
        let source = self.source.path();
        let target = self.target.as_path();

        match self.strategy {
            PlaceStrategy::Direct => place(fs, self.kind, source, target),
            PlaceStrategy::ReplaceExisting => {
                // A vanished source must not cost the user the entry it would replace.
                if !path_exists(source) {
                    return Err(OpError::NotFound {
                        path: source.to_path_buf(),
                    });
                }
                if path_exists(target) {
                    tracing::debug!(target = %target.display(), "Removing existing entry before replace");
                    fs.remove(target).map_err(|e| OpError::io(target, e))?;
                }
                place(fs, self.kind, source, target)
            }
            PlaceStrategy::CopyThenDelete => copy_then_delete(fs, source, target),
        }
    }
}

/// Place `source` at a free `target`.
fn place(fs: &dyn FileSystem, kind: BatchKind, source: &Path, target: &Path) -> Result<u64, OpError> {
    match kind {
        BatchKind::Copy => fs.copy(source, target).map_err(|e| OpError::io(source, e)),
        BatchKind::Move => match fs.rename(source, target) {
            Ok(()) => Ok(0),
            Err(e) => {
                // Cross-device moves and similar: fall back to copy + delete.
                tracing::debug!(error = %e, source = %source.display(), "Rename failed, copying instead");
                copy_then_delete(fs, source, target)
            }
        },
    }
}

fn copy_then_delete(fs: &dyn FileSystem, source: &Path, target: &Path) -> Result<u64, OpError> {
    let bytes = fs.copy(source, target).map_err(|e| OpError::io(source, e))?;
    fs.remove(source).map_err(|e| OpError::io(source, e))?;
    Ok(bytes)
}
