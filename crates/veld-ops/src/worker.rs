//! The single background batch worker.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use veld_core::OpsConfig;

use crate::conflict::ConflictResolution;
use crate::fs::{FileSystem, LocalFs};
use crate::operation::{BatchKind, OpError};
use crate::outcome::{BatchReport, ItemOutcome};
use crate::queue::{BatchRequest, OperationQueue, ResolutionRequest, Step};

/// Messages sent from the worker to the interactive loop.
#[derive(Debug)]
pub enum WorkerMessage {
    /// One item finished: applied, skipped or failed.
    ItemApplied(ItemOutcome),
    /// The batch is halted until the user answers.
    ConflictRequest(PendingConflict),
    /// The batch is over; the worker slot is already free.
    BatchDone(BatchReport),
}

/// A batch in flight: its queue, its cancellation token, and the worker slot.
#[derive(Debug)]
struct Job {
    queue: OperationQueue,
    token: CancellationToken,
    permit: OwnedSemaphorePermit,
}

/// A halted batch waiting for a resolution.
///
/// Holds the rest of the batch and the worker slot. Pass it back through
/// [`BatchWorker::resume`] to continue; dropping it abandons the batch.
#[derive(Debug)]
pub struct PendingConflict {
    request: ResolutionRequest,
    job: Job,
}

impl PendingConflict {
    pub fn request(&self) -> &ResolutionRequest {
        &self.request
    }

    /// Items still queued behind the conflicting one.
    pub fn remaining(&self) -> usize {
        self.job.queue.pending_len()
    }

    /// Abandon the batch and free the worker slot.
    pub fn cancel(self) -> BatchReport {
        let Job { queue, permit, .. } = self.job;
        let report = queue.cancel();
        drop(permit);
        report
    }
}

/// Runs one batch at a time off the interactive loop.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct BatchWorker {
    fs: Arc<dyn FileSystem>,
    config: OpsConfig,
    tx: mpsc::Sender<WorkerMessage>,
    slot: Arc<Semaphore>,
    current: Option<CancellationToken>,
}

impl BatchWorker {
    /// Create a worker and the receiving end of its message channel.
    pub fn new(fs: Arc<dyn FileSystem>, config: OpsConfig) -> (Self, mpsc::Receiver<WorkerMessage>) {
        let (tx, rx) = mpsc::channel(config.channel_size.max(1));
        let worker = Self {
            fs,
            config,
            tx,
            slot: Arc::new(Semaphore::new(1)),
            current: None,
        };
        (worker, rx)
    }

    /// Create a worker over the local filesystem.
    pub fn local(config: OpsConfig) -> (Self, mpsc::Receiver<WorkerMessage>) {
        Self::new(Arc::new(LocalFs), config)
    }

    /// Whether a batch, running or halted on a conflict, holds the slot.
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Resolve and start a batch.
    ///
    /// Fails with [`OpError::WorkerBusy`] while another batch holds the slot,
    /// or with a configuration error for a bad destination or source.
    pub fn submit(&mut self, request: BatchRequest) -> Result<(), OpError> {
        let permit = self.acquire()?;
        let queue = OperationQueue::from_request(request, &self.config)?;
        self.start(queue, permit);
        Ok(())
    }

    /// Start a batch over an already-built queue.
    pub fn submit_queue(&mut self, queue: OperationQueue) -> Result<(), OpError> {
        let permit = self.acquire()?;
        self.start(queue, permit);
        Ok(())
    }

    /// Answer a halted batch and continue it.
    pub fn resume(&mut self, pending: PendingConflict, resolution: ConflictResolution) {
        let PendingConflict { job, .. } = pending;
        self.current = Some(job.token.clone());
        tokio::spawn(run(self.fs.clone(), self.tx.clone(), job, Some(resolution)));
    }

    /// Ask the running batch to stop at the next item boundary.
    ///
    /// A batch halted on a conflict is cancelled through its
    /// [`PendingConflict`] instead.
    pub fn cancel(&self) {
        if let Some(token) = &self.current {
            token.cancel();
        }
    }

    fn acquire(&self) -> Result<OwnedSemaphorePermit, OpError> {
        self.slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| OpError::WorkerBusy)
    }

    fn start(&mut self, queue: OperationQueue, permit: OwnedSemaphorePermit) {
        tracing::info!(
            kind = %queue.kind(),
            items = queue.pending_len(),
            destination = %queue.destination().path().display(),
            "Starting batch"
        );
        let token = CancellationToken::new();
        self.current = Some(token.clone());
        let job = Job {
            queue,
            token,
            permit,
        };
        tokio::spawn(run(self.fs.clone(), self.tx.clone(), job, None));
    }
}

/// Drive a job until it halts, finishes or is cancelled.
async fn run(
    fs: Arc<dyn FileSystem>,
    tx: mpsc::Sender<WorkerMessage>,
    mut job: Job,
    mut resolution: Option<ConflictResolution>,
) {
    let kind: BatchKind = job.queue.kind();
    let destination: PathBuf = job.queue.destination().path().to_path_buf();

    loop {
        if job.token.is_cancelled() {
            let Job { queue, permit, .. } = job;
            let report = queue.cancel();
            drop(permit);
            let _ = tx.send(WorkerMessage::BatchDone(report)).await;
            return;
        }

        let Job {
            mut queue,
            token,
            permit,
        } = job;
        let fs = fs.clone();
        let answer = resolution.take();

        // Each item runs to completion on the blocking pool.
        let result = tokio::task::spawn_blocking(move || {
            let step = match answer {
                Some(resolution) => queue.resolve(resolution, &*fs),
                None => queue.step(&*fs),
            };
            (queue, step)
        })
        .await;

        match result {
            Ok((queue, Ok(Step::Item(outcome)))) => {
                job = Job {
                    queue,
                    token,
                    permit,
                };
                if tx.send(WorkerMessage::ItemApplied(outcome)).await.is_err() {
                    tracing::debug!("Receiver dropped, abandoning batch");
                    return;
                }
            }
            Ok((queue, Ok(Step::Conflict(request)))) => {
                let pending = PendingConflict {
                    request,
                    job: Job {
                        queue,
                        token,
                        permit,
                    },
                };
                let _ = tx.send(WorkerMessage::ConflictRequest(pending)).await;
                return;
            }
            Ok((_, Ok(Step::Done(report)))) => {
                drop(permit);
                let _ = tx.send(WorkerMessage::BatchDone(report)).await;
                return;
            }
            Ok((queue, Err(e))) => {
                tracing::warn!(error = %e, "Queue refused to advance");
                let report = queue.cancel();
                drop(permit);
                let _ = tx.send(WorkerMessage::BatchDone(report)).await;
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Batch worker task failed");
                drop(permit);
                let report = BatchReport::interrupted(kind, destination, e.to_string());
                let _ = tx.send(WorkerMessage::BatchDone(report)).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn test_plain_batch_reports_each_item_then_done() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        fs::write(temp.path().join("b.txt"), "b").unwrap();
        fs::create_dir(temp.path().join("dest")).unwrap();

        let (mut worker, mut rx) = BatchWorker::local(OpsConfig::default());
        worker
            .submit(BatchRequest::new(
                BatchKind::Copy,
                vec![temp.path().join("a.txt"), temp.path().join("b.txt")],
                temp.path().join("dest"),
            ))
            .unwrap();

        let mut items = 0;
        loop {
            match rx.recv().await.unwrap() {
                WorkerMessage::ItemApplied(outcome) => {
                    assert!(outcome.is_applied());
                    items += 1;
                }
                WorkerMessage::ConflictRequest(_) => panic!("unexpected conflict"),
                WorkerMessage::BatchDone(report) => {
                    assert_eq!(report.applied, 2);
                    break;
                }
            }
        }
        assert_eq!(items, 2);
        assert!(!worker.is_busy());
    }

    #[tokio::test]
    async fn test_bad_destination_frees_slot() {
        let temp = tempfile::tempdir().unwrap();
        let (mut worker, _rx) = BatchWorker::local(OpsConfig::default());

        let err = worker
            .submit(BatchRequest::new(
                BatchKind::Move,
                vec![],
                temp.path().join("missing"),
            ))
            .unwrap_err();
        assert!(matches!(err, OpError::Configuration { .. }));
        assert!(!worker.is_busy());
    }
}
