//! Error types for path resolution and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving a path into an entry.
#[derive(Debug, Error)]
pub enum EntryError {
    /// The path was empty.
    #[error("Empty path")]
    Empty,

    /// The working directory could not be determined.
    #[error("Cannot resolve {path} against the working directory: {source}")]
    WorkingDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform configuration directory is available.
    #[error("No configuration directory available")]
    NoConfigDir,

    /// Reading or writing the configuration file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("Malformed configuration in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl ConfigError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
