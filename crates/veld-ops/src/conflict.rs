//! Conflict detection and resolution planning.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::Display;
use veld_core::PathEntry;

use crate::fs::path_exists;
use crate::namer::DuplicateNamer;
use crate::operation::{BatchKind, OpError};

/// How the user chose to handle a colliding item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, Default)]
pub enum ConflictResolution {
    /// Remove the existing entry, then place the item.
    Replace,
    /// Place the item under a fresh `name (n).ext` name.
    Duplicate,
    /// Leave both sides untouched.
    #[default]
    Skip,
}

impl ConflictResolution {
    /// The choices offered for every conflict.
    pub const OPTIONS: [Self; 3] = [Self::Replace, Self::Duplicate, Self::Skip];

    /// Interpret a typed answer: `r` replaces, `d` duplicates, anything else skips.
    pub fn from_choice(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "r" => Self::Replace,
            "d" => Self::Duplicate,
            _ => Self::Skip,
        }
    }

    /// The key that selects this resolution.
    pub fn key(self) -> char {
        match self {
            Self::Replace => 'r',
            Self::Duplicate => 'd',
            Self::Skip => 's',
        }
    }
}

/// The kind of conflict encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    /// A file (or link) already exists at the destination.
    FileExists,
    /// A directory already exists at the destination.
    DirectoryExists,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileExists => write!(f, "File already exists"),
            Self::DirectoryExists => write!(f, "Directory already exists"),
        }
    }
}

/// A collision between an item and an existing destination entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The item being placed.
    pub source: PathEntry,
    /// The entry already occupying the item's name.
    pub existing: PathBuf,
    /// The kind of conflict.
    pub kind: ConflictKind,
}

/// Result of checking one item against the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Nothing occupies the target name.
    NoConflict { target: PathBuf },
    /// The target is the source itself; placing it is a no-op.
    SameFile { target: PathBuf },
    /// Something else occupies the target name.
    Conflict(Conflict),
}

/// How a placement reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceStrategy {
    /// Copy, or move by rename (falling back to copy then delete).
    Direct,
    /// Remove whatever occupies the target first, then place directly.
    ReplaceExisting,
    /// Copy to the target, and only then delete the source.
    CopyThenDelete,
}

/// A concrete filesystem change for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub kind: BatchKind,
    pub source: PathEntry,
    pub target: PathBuf,
    pub strategy: PlaceStrategy,
}

/// What to do with one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Place(Placement),
    Skip { source: PathEntry },
}

/// Decides whether items collide and what each resolution does.
///
/// Planning only reads the filesystem; it never changes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathConflictPolicy {
    namer: DuplicateNamer,
}

impl PathConflictPolicy {
    pub fn new(namer: DuplicateNamer) -> Self {
        Self { namer }
    }

    pub fn namer(&self) -> &DuplicateNamer {
        &self.namer
    }

    /// Check `destination/source.name` as it is right now.
    pub fn evaluate(&self, source: &PathEntry, destination: &PathEntry) -> Evaluation {
        let target = destination.path().join(source.name());

        let Ok(metadata) = std::fs::symlink_metadata(&target) else {
            return Evaluation::NoConflict { target };
        };

        let same = std::fs::canonicalize(&target)
            .map(|canonical| canonical == source.canonical())
            .unwrap_or(false);
        if same {
            return Evaluation::SameFile { target };
        }

        let kind = if metadata.is_dir() {
            ConflictKind::DirectoryExists
        } else {
            ConflictKind::FileExists
        };
        Evaluation::Conflict(Conflict {
            source: source.clone(),
            existing: target,
            kind,
        })
    }

    /// Plan an item that does not collide.
    pub fn plan_direct(
        &self,
        kind: BatchKind,
        source: &PathEntry,
        destination: &PathEntry,
    ) -> Result<Plan, OpError> {
        check_not_into_itself(source, destination)?;
        Ok(Plan::Place(Placement {
            kind,
            source: source.clone(),
            target: destination.path().join(source.name()),
            strategy: PlaceStrategy::Direct,
        }))
    }

    /// Plan a colliding item according to the user's resolution.
    pub fn resolve(
        &self,
        kind: BatchKind,
        source: &PathEntry,
        destination: &PathEntry,
        resolution: ConflictResolution,
    ) -> Result<Plan, OpError> {
        let target = destination.path().join(source.name());

        match resolution {
            ConflictResolution::Skip => Ok(Plan::Skip {
                source: source.clone(),
            }),
            ConflictResolution::Replace => {
                check_not_into_itself(source, destination)?;
                check_target_keeps_source(source, &target)?;
                Ok(Plan::Place(Placement {
                    kind,
                    source: source.clone(),
                    target,
                    strategy: PlaceStrategy::ReplaceExisting,
                }))
            }
            ConflictResolution::Duplicate => {
                check_not_into_itself(source, destination)?;
                let target = self.namer.next(&target)?;
                let strategy = match kind {
                    BatchKind::Copy => PlaceStrategy::Direct,
                    BatchKind::Move => PlaceStrategy::CopyThenDelete,
                };
                Ok(Plan::Place(Placement {
                    kind,
                    source: source.clone(),
                    target,
                    strategy,
                }))
            }
        }
    }
}

/// A directory cannot be placed anywhere below itself.
fn check_not_into_itself(source: &PathEntry, destination: &PathEntry) -> Result<(), OpError> {
    if source.is_dir() && destination.canonical().starts_with(source.canonical()) {
        return Err(OpError::SourceIsAncestor {
            path: source.path().to_path_buf(),
        });
    }
    Ok(())
}

/// Removing the target must not remove the source along with it.
fn check_target_keeps_source(source: &PathEntry, target: &Path) -> Result<(), OpError> {
    let canonical_target = std::fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf());
    if path_exists(target) && source.canonical().starts_with(&canonical_target) {
        return Err(OpError::TargetContainsSource {
            path: source.path().to_path_buf(),
            target: target.to_path_buf(),
        });
    }
    Ok(())
}
