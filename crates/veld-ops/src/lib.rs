//! Batch file operations engine for veld.
//!
//! A move or copy over a selection runs through an [`OperationQueue`]: one
//! item at a time, halting on each name collision until the user picks
//! Replace, Duplicate or Skip. [`BatchWorker`] drives queues off the
//! interactive loop and reports back over a channel. Deletes and copies can
//! also be collected in a [`DeferredActionLog`] and run together later, or
//! applied straight away through [`delete_selection`] and friends.

mod apply;
mod archive;
mod conflict;
mod deferred;
mod fs;
mod immediate;
mod namer;
mod operation;
mod outcome;
mod queue;
mod refresh;
mod worker;

pub use archive::{
    ArchiveFormat, ArchiveSummary, create_archive, default_archive_path, extract_archive,
};
pub use conflict::{
    Conflict, ConflictKind, ConflictResolution, Evaluation, PathConflictPolicy, PlaceStrategy,
    Placement, Plan,
};
pub use deferred::{DeferredAction, DeferredActionLog};
pub use fs::{FileSystem, LocalFs};
pub use immediate::{confirmed, create_directory, delete_prompt, delete_selection, rename_entry};
pub use namer::DuplicateNamer;
pub use operation::{BatchKind, OpError, OperationError, OperationKind};
pub use outcome::{ActionReport, BatchReport, ItemOutcome, SkipReason};
pub use queue::{BatchRequest, OperationQueue, QueueError, QueueState, ResolutionRequest, Step};
pub use refresh::{RefreshBroadcaster, RefreshTarget};
pub use worker::{BatchWorker, PendingConflict, WorkerMessage};
