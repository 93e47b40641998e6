//! Operation kinds and error types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Every kind of filesystem mutation the engine performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum OperationKind {
    Move,
    Copy,
    Delete,
    Rename,
    #[strum(serialize = "Create directory")]
    CreateDirectory,
}

impl OperationKind {
    /// Past-tense verb for notifications.
    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Move => "Moved",
            Self::Copy => "Copied",
            Self::Delete => "Deleted",
            Self::Rename => "Renamed",
            Self::CreateDirectory => "Created",
        }
    }

    /// Present participle for error messages.
    pub fn gerund(self) -> &'static str {
        match self {
            Self::Move => "moving",
            Self::Copy => "copying",
            Self::Delete => "deleting",
            Self::Rename => "renaming",
            Self::CreateDirectory => "creating directory",
        }
    }
}

/// The kinds of operation a batch queue can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum BatchKind {
    Move,
    Copy,
}

impl From<BatchKind> for OperationKind {
    fn from(kind: BatchKind) -> Self {
        match kind {
            BatchKind::Move => Self::Move,
            BatchKind::Copy => Self::Copy,
        }
    }
}

/// Errors raised by the operation engine.
#[derive(Debug, Error)]
pub enum OpError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Something already occupies the path.
    #[error("'{}' already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    /// The request itself is malformed; aborts only that request.
    #[error("{message}")]
    Configuration { message: String },

    /// No unused duplicate name was found.
    #[error("No free name for {path} after {attempts} attempts")]
    ExhaustedNamespace { path: PathBuf, attempts: usize },

    /// A directory would be placed inside itself.
    #[error("Cannot copy or move {path} into itself")]
    SourceIsAncestor { path: PathBuf },

    /// Replacing the target would destroy the source.
    #[error("Cannot replace {target}: it contains {path}")]
    TargetContainsSource { path: PathBuf, target: PathBuf },

    /// Reading or writing an archive failed.
    #[error("Archive error at {path}: {message}")]
    Archive { path: PathBuf, message: String },

    /// The single batch worker is occupied.
    #[error("Another batch operation is still in progress")]
    WorkerBusy,
}

impl OpError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Error for a destination that is not an existing directory.
    pub fn not_a_directory(path: &Path) -> Self {
        Self::configuration(format!("'{}' is not a valid directory", path.display()))
    }

    /// Whether this error only affects the item it was raised for.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. }
                | Self::NotFound { .. }
                | Self::AlreadyExists { .. }
                | Self::Io { .. }
        )
    }
}

/// A per-item failure, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// The path that caused the error.
    pub path: PathBuf,
    /// A human-readable error message.
    pub message: String,
}

impl OperationError {
    /// Create a new operation error.
    pub fn new(path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    /// Record an engine error against the item it was raised for.
    pub fn from_error(path: &Path, error: &OpError) -> Self {
        Self::new(path.to_path_buf(), error.to_string())
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_error_io_classifies() {
        let err = OpError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, OpError::PermissionDenied { .. }));
        assert!(err.is_transient());

        let err = OpError::io("/test/path", std::io::Error::other("disk full"));
        assert!(matches!(err, OpError::Io { .. }));

        let err = OpError::io(
            "/test/b.txt",
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists"),
        );
        assert_eq!(err.to_string(), "'/test/b.txt' already exists");
    }

    #[test]
    fn test_configuration_is_not_transient() {
        let err = OpError::not_a_directory(Path::new("/nope"));
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "'/nope' is not a valid directory");
    }

    #[test]
    fn test_batch_kind_widens() {
        assert_eq!(OperationKind::from(BatchKind::Move), OperationKind::Move);
        assert_eq!(OperationKind::Copy.past_tense(), "Copied");
    }
}
