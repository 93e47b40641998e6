//! Path entries captured at enqueue time.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EntryError;

/// A filesystem path with a cached directory flag.
///
/// Entries are resolved against the working directory when they are created
/// and never change afterwards; the flag reflects the filesystem at that
/// moment, not at the time the entry is acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathEntry {
    path: PathBuf,
    is_dir: bool,
}

impl PathEntry {
    /// Resolve a path against the current working directory and probe it.
    ///
    /// `.` and `..` components are folded away lexically. A path that does
    /// not exist still resolves (as a non-directory); acting on it later
    /// reports the missing path for that item only.
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self, EntryError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(EntryError::Empty);
        }

        let absolute = std::path::absolute(path)
            .map(|p| normalize(&p))
            .map_err(|source| EntryError::WorkingDirectory {
                path: path.to_path_buf(),
                source,
            })?;
        let is_dir = fs::metadata(&absolute).map(|m| m.is_dir()).unwrap_or(false);

        Ok(Self {
            path: absolute,
            is_dir,
        })
    }

    /// Create an entry from already-known parts without touching the filesystem.
    pub fn from_parts(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            is_dir,
        }
    }

    /// The resolved path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the path was a directory when the entry was created.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// The final path component, or the whole path for roots.
    pub fn name(&self) -> &OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }

    /// The final path component as displayable text.
    pub fn display_name(&self) -> String {
        self.name().to_string_lossy().into_owned()
    }

    /// The directory containing this entry.
    pub fn parent(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// Canonical form used for identity comparisons.
    ///
    /// Falls back to the stored path when the entry no longer exists.
    pub fn canonical(&self) -> PathBuf {
        fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone())
    }

    /// Consume the entry, returning its path.
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

impl AsRef<Path> for PathEntry {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Fold `.` and `..` out of a path without touching the filesystem.
///
/// `..` at the root stays at the root. Relative paths keep leading `..`
/// components they cannot cancel.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}
