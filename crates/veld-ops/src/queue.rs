//! The batch move/copy queue.
//!
//! A queue drives one item at a time through evaluate → (ask) → apply. It is
//! synchronous and owns no threads; [`crate::BatchWorker`] runs it off the
//! interactive loop. The state machine is
//!
//! ```text
//! Idle --step--> Processing
//! Processing --step--> Processing            (item applied, skipped or failed)
//! Processing --step--> ConflictPending       (resolution request emitted)
//! ConflictPending --resolve--> Processing
//! Processing --step--> Done                  (pending drained)
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;

use thiserror::Error;
use veld_core::{OpsConfig, PathEntry};

use crate::conflict::{
    Conflict, ConflictKind, ConflictResolution, Evaluation, PathConflictPolicy, Plan,
};
use crate::fs::FileSystem;
use crate::namer::DuplicateNamer;
use crate::operation::{BatchKind, OpError, OperationError, OperationKind};
use crate::outcome::{BatchReport, ItemOutcome, SkipReason};

/// A user-initiated move or copy, as handed over by the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub kind: BatchKind,
    pub sources: Vec<PathBuf>,
    pub destination: PathBuf,
}

impl BatchRequest {
    pub fn new(kind: BatchKind, sources: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            sources,
            destination: destination.into(),
        }
    }
}

/// Where the queue is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Processing,
    ConflictPending,
    Done,
}

/// A question for the user about one colliding item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub item: PathEntry,
    pub existing: PathBuf,
    pub kind: ConflictKind,
    pub options: [ConflictResolution; 3],
}

impl ResolutionRequest {
    fn from_conflict(conflict: &Conflict) -> Self {
        Self {
            item: conflict.source.clone(),
            existing: conflict.existing.clone(),
            kind: conflict.kind,
            options: ConflictResolution::OPTIONS,
        }
    }

    pub fn item_name(&self) -> String {
        self.item.display_name()
    }

    /// Prompt text offering every option.
    pub fn prompt(&self) -> String {
        format!(
            "'{}' exists. Replace (r), Duplicate (d), or Skip (s)?",
            self.item_name()
        )
    }
}

/// What one call into the queue produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// An item was applied, skipped or failed.
    Item(ItemOutcome),
    /// The queue halted on a collision.
    Conflict(ResolutionRequest),
    /// Nothing is left; the batch is complete.
    Done(BatchReport),
}

/// Calls that do not fit the queue's current state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Waiting for a decision on '{name}'")]
    AwaitingResolution { name: String },

    #[error("No conflict is waiting for a decision")]
    NothingToResolve,

    #[error("The batch has already finished")]
    Finished,
}

/// Ordered pending items plus a destination, processed one at a time.
#[derive(Debug)]
pub struct OperationQueue {
    kind: BatchKind,
    pending: VecDeque<PathEntry>,
    destination: PathEntry,
    awaiting: Option<Conflict>,
    state: QueueState,
    policy: PathConflictPolicy,
    report: BatchReport,
}

impl OperationQueue {
    /// Build a queue over already-resolved entries.
    ///
    /// The destination must be an existing directory.
    pub fn new(
        kind: BatchKind,
        sources: Vec<PathEntry>,
        destination: PathEntry,
        policy: PathConflictPolicy,
    ) -> Result<Self, OpError> {
        if !destination.path().is_dir() {
            return Err(OpError::not_a_directory(destination.path()));
        }

        Ok(Self {
            kind,
            pending: sources.into(),
            report: BatchReport::new(kind, destination.path()),
            destination,
            awaiting: None,
            state: QueueState::Idle,
            policy,
        })
    }

    /// Resolve a front-end request against the working directory.
    pub fn from_request(request: BatchRequest, config: &OpsConfig) -> Result<Self, OpError> {
        let destination = PathEntry::resolve(&request.destination)
            .map_err(|e| OpError::configuration(format!("Invalid destination: {e}")))?;
        let sources = request
            .sources
            .iter()
            .map(PathEntry::resolve)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| OpError::configuration(format!("Invalid source: {e}")))?;

        let policy = PathConflictPolicy::new(DuplicateNamer::new(config.max_duplicate_attempts));
        Self::new(request.kind, sources, destination, policy)
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn destination(&self) -> &PathEntry {
        &self.destination
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Items not yet taken off the queue.
    pub fn pending(&self) -> impl Iterator<Item = &PathEntry> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The item the queue is halted on, if any.
    pub fn awaiting_resolution(&self) -> Option<&PathEntry> {
        self.awaiting.as_ref().map(|c| &c.source)
    }

    /// Process the next pending item.
    pub fn step(&mut self, fs: &dyn FileSystem) -> Result<Step, QueueError> {
        match self.state {
            QueueState::Done => return Err(QueueError::Finished),
            QueueState::ConflictPending => {
                return Err(QueueError::AwaitingResolution {
                    name: self
                        .awaiting_resolution()
                        .map(PathEntry::display_name)
                        .unwrap_or_default(),
                });
            }
            QueueState::Idle => self.state = QueueState::Processing,
            QueueState::Processing => {}
        }

        let Some(item) = self.pending.pop_front() else {
            self.state = QueueState::Done;
            tracing::info!(summary = %self.report.summary(), "Batch complete");
            return Ok(Step::Done(self.report.clone()));
        };

        tracing::debug!(item = %item.path().display(), kind = %self.kind, "Processing item");
        let outcome = match self.policy.evaluate(&item, &self.destination) {
            Evaluation::NoConflict { .. } => {
                let plan = self.policy.plan_direct(self.kind, &item, &self.destination);
                self.execute(item, plan, fs)
            }
            Evaluation::SameFile { .. } => ItemOutcome::Skipped {
                kind: self.kind.into(),
                source: item,
                reason: SkipReason::SameFile,
            },
            Evaluation::Conflict(conflict) => {
                let request = ResolutionRequest::from_conflict(&conflict);
                tracing::debug!(item = %request.item_name(), "Conflict, waiting for resolution");
                self.awaiting = Some(conflict);
                self.state = QueueState::ConflictPending;
                return Ok(Step::Conflict(request));
            }
        };

        self.report.record(&outcome);
        Ok(Step::Item(outcome))
    }

    /// Answer the outstanding conflict and apply the chosen plan.
    pub fn resolve(
        &mut self,
        resolution: ConflictResolution,
        fs: &dyn FileSystem,
    ) -> Result<Step, QueueError> {
        if self.state != QueueState::ConflictPending {
            return Err(QueueError::NothingToResolve);
        }
        let Some(conflict) = self.awaiting.take() else {
            return Err(QueueError::NothingToResolve);
        };
        self.state = QueueState::Processing;

        tracing::debug!(item = %conflict.source.display_name(), %resolution, "Conflict resolved");
        let plan = self
            .policy
            .resolve(self.kind, &conflict.source, &self.destination, resolution);
        let outcome = self.execute(conflict.source, plan, fs);

        self.report.record(&outcome);
        Ok(Step::Item(outcome))
    }

    /// Run until the queue halts on a conflict or finishes, reporting each
    /// item outcome along the way.
    pub fn drive(
        &mut self,
        fs: &dyn FileSystem,
        mut on_item: impl FnMut(ItemOutcome),
    ) -> Result<Step, QueueError> {
        loop {
            match self.step(fs)? {
                Step::Item(outcome) => on_item(outcome),
                halted => return Ok(halted),
            }
        }
    }

    /// Abandon the batch between items. Applied items stay applied.
    pub fn cancel(mut self) -> BatchReport {
        let remaining = self.pending.len() + usize::from(self.awaiting.is_some());
        self.report.remaining = remaining;
        self.report.cancelled = remaining > 0;
        tracing::info!(remaining, "Batch cancelled");
        self.report
    }

    fn execute(
        &self,
        item: PathEntry,
        plan: Result<Plan, OpError>,
        fs: &dyn FileSystem,
    ) -> ItemOutcome {
        let kind = OperationKind::from(self.kind);
        let result = plan.and_then(|plan| match plan {
            Plan::Skip { .. } => Ok(None),
            Plan::Place(placement) => placement.apply(fs).map(|_| Some(placement.target)),
        });

        match result {
            Ok(Some(target)) => ItemOutcome::Applied {
                kind,
                source: item,
                target,
            },
            Ok(None) => ItemOutcome::Skipped {
                kind,
                source: item,
                reason: SkipReason::UserChoice,
            },
            Err(e) => {
                tracing::warn!(item = %item.path().display(), error = %e, "Item failed");
                let error = OperationError::from_error(item.path(), &e);
                ItemOutcome::Failed {
                    kind,
                    source: item,
                    error,
                }
            }
        }
    }
}
