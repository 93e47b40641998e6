//! Non-colliding sibling names of the form `name (n).ext`.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use veld_core::DEFAULT_MAX_DUPLICATE_ATTEMPTS;

use crate::fs::path_exists;
use crate::operation::OpError;

/// Generates duplicate names by probing `stem (1).ext`, `stem (2).ext`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateNamer {
    max_attempts: usize,
}

impl Default for DuplicateNamer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DUPLICATE_ATTEMPTS)
    }
}

impl DuplicateNamer {
    /// Create a namer that gives up after `max_attempts` probes.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Find the first unused sibling name for `path`.
    ///
    /// The returned path did not exist when it was probed.
    pub fn next(&self, path: &Path) -> Result<PathBuf, OpError> {
        let parent = path.parent().unwrap_or(Path::new(""));
        let stem = path.file_stem().unwrap_or_default();
        let extension = path.extension();

        for counter in 1..=self.max_attempts {
            let candidate = parent.join(candidate_name(stem, extension, counter));
            if !path_exists(&candidate) {
                return Ok(candidate);
            }
        }

        tracing::warn!(path = %path.display(), attempts = self.max_attempts, "Duplicate names exhausted");
        Err(OpError::ExhaustedNamespace {
            path: path.to_path_buf(),
            attempts: self.max_attempts,
        })
    }
}

/// Build `stem (counter).extension` without lossy conversion.
fn candidate_name(stem: &OsStr, extension: Option<&OsStr>, counter: usize) -> OsString {
    let mut name = OsString::from(stem);
    name.push(format!(" ({counter})"));
    if let Some(ext) = extension {
        name.push(".");
        name.push(ext);
    }
    name
}
