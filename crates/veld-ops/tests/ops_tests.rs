use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use veld_core::{OpsConfig, Panel, PathEntry, Severity, ViewId};
use veld_ops::{
    BatchKind, BatchRequest, BatchWorker, ConflictResolution, DeferredAction, DeferredActionLog,
    DuplicateNamer, FileSystem, ItemOutcome, LocalFs, OpError, OperationKind, OperationQueue,
    RefreshBroadcaster, SkipReason, Step, WorkerMessage, delete_selection,
};

/// Local filesystem with injectable failures and a call log.
#[derive(Debug, Default)]
struct FlakyFs {
    fail_copy_named: Option<String>,
    fail_remove: bool,
    calls: Mutex<Vec<String>>,
}

impl FlakyFs {
    fn record(&self, call: &str, path: &Path) {
        let name = path.file_name().unwrap().to_string_lossy();
        self.calls.lock().unwrap().push(format!("{call} {name}"));
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl FileSystem for FlakyFs {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.record("copy", from);
        let name = from.file_name().unwrap().to_string_lossy();
        if self.fail_copy_named.as_deref() == Some(name.as_ref()) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected"));
        }
        LocalFs.copy(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("rename", from);
        LocalFs.rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.record("remove", path);
        if self.fail_remove {
            return Err(io::Error::other("injected"));
        }
        LocalFs.remove(path)
    }

    fn trash(&self, path: &Path) -> io::Result<()> {
        self.record("trash", path);
        LocalFs.remove(path)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        self.record("mkdir", path);
        LocalFs.create_dir(path)
    }
}

fn write(path: PathBuf, contents: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn queue(kind: BatchKind, sources: Vec<PathBuf>, destination: &Path) -> OperationQueue {
    OperationQueue::from_request(
        BatchRequest::new(kind, sources, destination),
        &OpsConfig::default(),
    )
    .unwrap()
}

/// Run a queue to completion, answering every conflict with `answer`.
fn run_all(
    queue: &mut OperationQueue,
    fs: &dyn FileSystem,
    answer: ConflictResolution,
) -> (Vec<ItemOutcome>, usize, veld_ops::BatchReport) {
    let mut outcomes = Vec::new();
    let mut conflicts = 0;
    loop {
        match queue.drive(fs, |o| outcomes.push(o)).unwrap() {
            Step::Conflict(_) => {
                conflicts += 1;
                if let Step::Item(o) = queue.resolve(answer, fs).unwrap() {
                    outcomes.push(o);
                }
            }
            Step::Done(report) => return (outcomes, conflicts, report),
            Step::Item(_) => unreachable!(),
        }
    }
}

#[test]
fn test_non_conflicting_batch_applies_every_item() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("dest");
    fs::create_dir(&dest).unwrap();
    let sources: Vec<PathBuf> = (0..4)
        .map(|i| write(temp.path().join(format!("src/f{i}.txt")), "x"))
        .collect();

    let mut q = queue(BatchKind::Move, sources.clone(), &dest);
    let (outcomes, conflicts, report) = run_all(&mut q, &LocalFs, ConflictResolution::Skip);

    assert_eq!(conflicts, 0);
    assert_eq!(outcomes.len(), 4);
    assert_eq!(report.applied, 4);
    assert!(report.is_success());
    assert!(report.notification().message.starts_with("Move operation complete"));
    for source in &sources {
        assert!(!source.exists());
        assert!(dest.join(source.file_name().unwrap()).exists());
    }
    assert_eq!(
        report.touched_dirs().collect::<Vec<_>>(),
        vec![dest.as_path(), temp.path().join("src").as_path()]
    );
}

#[test]
fn test_finished_move_reloads_source_and_destination_views() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    let dest = temp.path().join("dest");
    fs::create_dir(&dest).unwrap();
    let a = write(src.join("a.txt"), "a");
    let b = write(src.join("b.txt"), "b");

    let mut panels = vec![
        Panel::new(ViewId(1), &src),
        Panel::new(ViewId(2), &dest),
        Panel::new(ViewId(3), temp.path().join("elsewhere")),
    ];
    panels[0].select(PathEntry::resolve(&a).unwrap());
    panels[0].select(PathEntry::resolve(&b).unwrap());

    let mut q = queue(BatchKind::Move, panels[0].selection().paths(), &dest);
    let (_, _, report) = run_all(&mut q, &LocalFs, ConflictResolution::Skip);
    let reloaded = RefreshBroadcaster.batch_finished(&mut panels, Some(ViewId(1)), &report);

    assert_eq!(report.applied, 2);
    assert_eq!(reloaded, 2);
    assert_eq!(panels[0].generation(), 1);
    assert_eq!(panels[1].generation(), 1);
    assert_eq!(panels[2].generation(), 0);
    assert!(panels[0].selection().is_empty());
}

#[test]
fn test_copy_or_move_onto_itself_is_skipped() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("dest");
    let a = write(dest.join("a.txt"), "same");

    for kind in [BatchKind::Copy, BatchKind::Move] {
        let mut q = queue(kind, vec![a.clone()], &dest);
        let (outcomes, conflicts, report) = run_all(&mut q, &LocalFs, ConflictResolution::Replace);

        assert_eq!(conflicts, 0);
        assert!(matches!(
            outcomes.as_slice(),
            [ItemOutcome::Skipped {
                reason: SkipReason::SameFile,
                ..
            }]
        ));
        assert_eq!(outcomes[0].notification().severity, Severity::Warning);
        assert_eq!(report.skipped, 1);
        assert_eq!(fs::read_to_string(&a).unwrap(), "same");
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 1);
    }
}

#[test]
fn test_replace_directory_drops_old_subtree() {
    let temp = TempDir::new().unwrap();
    write(temp.path().join("src/b/new.txt"), "new");
    write(temp.path().join("dest/b/stale/old.txt"), "old");

    let mut q = queue(
        BatchKind::Copy,
        vec![temp.path().join("src/b")],
        &temp.path().join("dest"),
    );
    let (_, conflicts, report) = run_all(&mut q, &LocalFs, ConflictResolution::Replace);

    assert_eq!(conflicts, 1);
    assert_eq!(report.applied, 1);
    assert!(temp.path().join("dest/b/new.txt").exists());
    assert!(!temp.path().join("dest/b/stale").exists());
}

#[test]
fn test_namer_returns_unused_path() {
    let temp = TempDir::new().unwrap();
    let original = write(temp.path().join("report.pdf"), "");
    write(temp.path().join("report (1).pdf"), "");
    write(temp.path().join("report (2).pdf"), "");

    let next = DuplicateNamer::default().next(&original).unwrap();
    assert_eq!(next, temp.path().join("report (3).pdf"));
    assert!(!next.exists());
}

#[test]
fn test_move_duplicate_copies_before_deleting() {
    let temp = TempDir::new().unwrap();
    let source = write(temp.path().join("a.txt"), "new");
    write(temp.path().join("dest/a.txt"), "old");

    let flaky = FlakyFs {
        fail_remove: true,
        ..FlakyFs::default()
    };
    let mut q = queue(BatchKind::Move, vec![source.clone()], &temp.path().join("dest"));
    let (outcomes, _, report) = run_all(&mut q, &flaky, ConflictResolution::Duplicate);

    assert_eq!(flaky.calls(), vec!["copy a.txt", "remove a.txt"]);
    assert!(outcomes[0].is_failed());
    assert_eq!(report.failed, 1);
    assert!(source.exists(), "source must survive a failed delete");
    assert_eq!(
        fs::read_to_string(temp.path().join("dest/a (1).txt")).unwrap(),
        "new"
    );
    assert_eq!(fs::read_to_string(temp.path().join("dest/a.txt")).unwrap(), "old");
}

#[test]
fn test_skip_leaves_both_sides_and_advances() {
    let temp = TempDir::new().unwrap();
    let a = write(temp.path().join("a.txt"), "new");
    let c = write(temp.path().join("c.txt"), "c");
    write(temp.path().join("dest/a.txt"), "old");

    let mut q = queue(BatchKind::Move, vec![a.clone(), c.clone()], &temp.path().join("dest"));
    let (outcomes, conflicts, report) = run_all(&mut q, &LocalFs, ConflictResolution::Skip);

    assert_eq!(conflicts, 1);
    assert_eq!(outcomes.len(), 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(fs::read_to_string(&a).unwrap(), "new");
    assert_eq!(fs::read_to_string(temp.path().join("dest/a.txt")).unwrap(), "old");
    assert!(temp.path().join("dest/c.txt").exists());
}

#[test]
fn test_failure_in_middle_does_not_stop_batch() {
    let temp = TempDir::new().unwrap();
    let sources = vec![
        write(temp.path().join("one.txt"), "1"),
        write(temp.path().join("two.txt"), "2"),
        write(temp.path().join("three.txt"), "3"),
    ];
    let dest = temp.path().join("dest");
    fs::create_dir(&dest).unwrap();

    let flaky = FlakyFs {
        fail_copy_named: Some("two.txt".to_string()),
        ..FlakyFs::default()
    };
    let mut q = queue(BatchKind::Copy, sources, &dest);
    let (outcomes, _, report) = run_all(&mut q, &flaky, ConflictResolution::Skip);

    let failed: Vec<_> = outcomes.iter().filter(|o| o.is_failed()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source().display_name(), "two.txt");
    assert_eq!(report.applied, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(dest.join("one.txt").exists());
    assert!(!dest.join("two.txt").exists());
    assert!(dest.join("three.txt").exists());
}

#[test]
fn test_file_and_directory_with_one_conflict() {
    let temp = TempDir::new().unwrap();
    let a = write(temp.path().join("a.txt"), "new");
    write(temp.path().join("b/inner.txt"), "inner");
    write(temp.path().join("dest/a.txt"), "old");

    let mut q = queue(
        BatchKind::Copy,
        vec![a, temp.path().join("b")],
        &temp.path().join("dest"),
    );

    let first = q.step(&LocalFs).unwrap();
    let Step::Conflict(request) = first else {
        panic!("expected a conflict for a.txt, got {first:?}");
    };
    assert_eq!(request.item_name(), "a.txt");
    assert_eq!(request.options, ConflictResolution::OPTIONS);
    assert_eq!(
        request.prompt(),
        "'a.txt' exists. Replace (r), Duplicate (d), or Skip (s)?"
    );

    let Step::Item(ItemOutcome::Applied { target, .. }) =
        q.resolve(ConflictResolution::Duplicate, &LocalFs).unwrap()
    else {
        panic!("duplicate should apply");
    };
    assert_eq!(target, temp.path().join("dest/a (1).txt"));

    let second = q.step(&LocalFs).unwrap();
    assert!(matches!(second, Step::Item(ref o) if o.is_applied()));
    assert!(matches!(q.step(&LocalFs).unwrap(), Step::Done(_)));

    assert_eq!(fs::read_to_string(temp.path().join("dest/a (1).txt")).unwrap(), "new");
    assert_eq!(fs::read_to_string(temp.path().join("dest/a.txt")).unwrap(), "old");
    assert_eq!(
        fs::read_to_string(temp.path().join("dest/b/inner.txt")).unwrap(),
        "inner"
    );
}

#[test]
fn test_deferred_two_deletes_and_one_copy() {
    let temp = TempDir::new().unwrap();
    let gone1 = write(temp.path().join("work/old1.log"), "1");
    let gone2 = write(temp.path().join("work/old2.log"), "2");
    let keep = write(temp.path().join("work/keep.txt"), "keep");
    let backup = temp.path().join("backup");
    fs::create_dir(&backup).unwrap();

    let mut panels = vec![
        Panel::new(ViewId(1), temp.path().join("work")),
        Panel::new(ViewId(2), &backup),
    ];
    let mut log = DeferredActionLog::default();

    panels[0].toggle(PathEntry::resolve(&gone1).unwrap());
    panels[0].toggle(PathEntry::resolve(&gone2).unwrap());
    assert_eq!(
        log.queue_selection(&mut panels[0], OperationKind::Delete, None).unwrap(),
        2
    );
    assert!(panels[0].selection().is_empty());

    panels[0].toggle(PathEntry::resolve(&keep).unwrap());
    log.queue_selection(&mut panels[0], OperationKind::Copy, Some(backup.as_path()))
        .unwrap();
    assert_eq!(log.lines(), vec!["delete: old1.log", "delete: old2.log", "copy: keep.txt"]);

    // Selected after queueing; still cleared by execution.
    panels[0].toggle(PathEntry::resolve(&keep).unwrap());

    let report = log.execute_all(&LocalFs, &mut panels);

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.failed(), 0);
    assert!(!gone1.exists());
    assert!(!gone2.exists());
    assert_eq!(fs::read_to_string(backup.join("keep.txt")).unwrap(), "keep");
    assert!(keep.exists());
    assert!(log.is_empty());
    assert!(panels[0].selection().is_empty());
    assert_eq!(report.reloaded, 2);
    assert_eq!(panels[1].generation(), 1);
}

#[test]
fn test_deferred_delete_through_parent_components_reloads_view() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("x")).unwrap();
    let file = write(temp.path().join("docs/a.txt"), "a");
    let mut panels = vec![Panel::new(ViewId(1), temp.path().join("docs"))];

    let mut log = DeferredActionLog::default();
    log.enqueue(DeferredAction::Delete {
        target: PathEntry::resolve(temp.path().join("x/../docs/a.txt")).unwrap(),
    });
    let report = log.execute_all(&LocalFs, &mut panels);

    assert!(!file.exists());
    assert_eq!(report.reloaded, 1);
    assert_eq!(panels[0].generation(), 1);
}

#[cfg(unix)]
#[test]
fn test_deferred_copy_into_itself_through_symlink_fails() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    write(src.join("f.txt"), "f");
    let alias = temp.path().join("alias");
    std::os::unix::fs::symlink(&src, &alias).unwrap();

    let mut panel = Panel::new(ViewId(1), temp.path());
    panel.select(PathEntry::resolve(&src).unwrap());
    let mut log = DeferredActionLog::default();
    log.queue_selection(&mut panel, OperationKind::Copy, Some(alias.as_path()))
        .unwrap();
    let report = log.execute_all(&LocalFs, &mut [panel]);

    assert_eq!(report.failed(), 1);
    assert!(!src.join("src").exists());
    assert_eq!(fs::read_dir(&src).unwrap().count(), 1);
}

#[test]
fn test_delete_selection_reports_each_item_and_refreshes() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    let a = write(work.join("a.txt"), "a");
    let b = write(work.join("sub/b.txt"), "b");
    let mut panels = vec![
        Panel::new(ViewId(1), &work),
        Panel::new(ViewId(2), temp.path().join("other")),
    ];
    panels[0].select(PathEntry::resolve(&a).unwrap());
    panels[0].select(PathEntry::resolve(work.join("sub")).unwrap());

    let report = delete_selection(&LocalFs, &mut panels, ViewId(1), false);

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failed(), 0);
    assert!(!a.exists());
    assert!(!b.exists());
    assert!(panels[0].selection().is_empty());
    assert_eq!(report.reloaded, 1);
    assert_eq!(panels[0].generation(), 1);
    assert_eq!(panels[1].generation(), 0);
    let messages: Vec<String> = report.notifications().map(|n| n.message).collect();
    assert_eq!(messages, vec!["Deleted a.txt", "Deleted sub"]);
}

#[test]
fn test_delete_selection_failure_keeps_going() {
    let temp = TempDir::new().unwrap();
    let a = write(temp.path().join("a.txt"), "a");
    let mut panels = vec![Panel::new(ViewId(1), temp.path())];
    panels[0].select(PathEntry::resolve(&a).unwrap());
    panels[0].select(PathEntry::resolve(temp.path().join("gone.txt")).unwrap());

    let flaky = FlakyFs::default();
    let report = delete_selection(&flaky, &mut panels, ViewId(1), true);

    assert_eq!(flaky.calls(), vec!["trash a.txt", "trash gone.txt"]);
    assert_eq!(report.failed(), 1);
    assert!(report.outcomes[0].is_applied());
    assert!(!a.exists());
    assert!(panels[0].selection().is_empty());
}

#[test]
fn test_deferred_copy_requires_directory() {
    let temp = TempDir::new().unwrap();
    let file = write(temp.path().join("a.txt"), "a");
    let mut panel = Panel::new(ViewId(1), temp.path());
    panel.toggle(PathEntry::resolve(&file).unwrap());

    let mut log = DeferredActionLog::default();
    let err = log
        .queue_selection(&mut panel, OperationKind::Copy, Some(temp.path().join("nope").as_path()))
        .unwrap_err();
    assert!(matches!(err, OpError::Configuration { .. }));
    assert!(log.is_empty());
}

#[test]
fn test_refresh_matches_descendants_only() {
    let mut views = vec![
        Panel::new(ViewId(1), "/home/u/docs"),
        Panel::new(ViewId(2), "/home/u/pics"),
    ];

    let reloaded =
        RefreshBroadcaster.notify(&mut views, Path::new("/home/u/docs/sub/file.txt"));
    assert_eq!(reloaded, 1);
    assert_eq!(views[0].generation(), 1);
    assert_eq!(views[1].generation(), 0);

    RefreshBroadcaster.notify(&mut views, Path::new("/home/u/pics"));
    assert_eq!(views[0].generation(), 1);
    assert_eq!(views[1].generation(), 1);
}

async fn next_message(rx: &mut tokio::sync::mpsc::Receiver<WorkerMessage>) -> WorkerMessage {
    rx.recv().await.expect("worker channel closed")
}

#[tokio::test]
async fn test_worker_halts_on_conflict_and_resumes() {
    let temp = TempDir::new().unwrap();
    let a = write(temp.path().join("a.txt"), "new");
    let c = write(temp.path().join("c.txt"), "c");
    write(temp.path().join("dest/a.txt"), "old");

    let (mut worker, mut rx) = BatchWorker::local(OpsConfig::default());
    worker
        .submit(BatchRequest::new(BatchKind::Copy, vec![a, c], temp.path().join("dest")))
        .unwrap();

    let WorkerMessage::ConflictRequest(pending) = next_message(&mut rx).await else {
        panic!("expected a conflict first");
    };
    assert_eq!(pending.request().item_name(), "a.txt");
    assert_eq!(pending.remaining(), 1);

    // The halted batch still owns the worker.
    assert!(worker.is_busy());
    let busy = worker.submit(BatchRequest::new(BatchKind::Copy, vec![], temp.path()));
    assert!(matches!(busy, Err(OpError::WorkerBusy)));

    worker.resume(pending, ConflictResolution::Duplicate);

    let mut applied = Vec::new();
    let report = loop {
        match next_message(&mut rx).await {
            WorkerMessage::ItemApplied(outcome) => applied.push(outcome),
            WorkerMessage::ConflictRequest(_) => panic!("only one conflict expected"),
            WorkerMessage::BatchDone(report) => break report,
        }
    };

    assert_eq!(applied.len(), 2);
    assert_eq!(report.applied, 2);
    assert!(!worker.is_busy());
    assert!(temp.path().join("dest/a (1).txt").exists());
    assert!(temp.path().join("dest/c.txt").exists());
}

#[tokio::test]
async fn test_cancelling_pending_conflict_frees_worker() {
    let temp = TempDir::new().unwrap();
    let a = write(temp.path().join("a.txt"), "new");
    write(temp.path().join("dest/a.txt"), "old");

    let (mut worker, mut rx) = BatchWorker::local(OpsConfig::default());
    worker
        .submit(BatchRequest::new(BatchKind::Move, vec![a.clone()], temp.path().join("dest")))
        .unwrap();

    let WorkerMessage::ConflictRequest(pending) = next_message(&mut rx).await else {
        panic!("expected a conflict");
    };
    let report = pending.cancel();

    assert!(report.cancelled);
    assert_eq!(report.remaining, 1);
    assert!(!worker.is_busy());
    assert!(a.exists());
}

#[tokio::test]
async fn test_dropping_pending_conflict_frees_worker() {
    let temp = TempDir::new().unwrap();
    let a = write(temp.path().join("a.txt"), "new");
    let b = write(temp.path().join("b.txt"), "b");
    write(temp.path().join("dest/a.txt"), "old");

    let (mut worker, mut rx) = BatchWorker::local(OpsConfig::default());
    worker
        .submit(BatchRequest::new(
            BatchKind::Move,
            vec![a.clone(), b.clone()],
            temp.path().join("dest"),
        ))
        .unwrap();

    let WorkerMessage::ConflictRequest(pending) = next_message(&mut rx).await else {
        panic!("expected a conflict");
    };
    assert!(worker.is_busy());
    drop(pending);

    assert!(!worker.is_busy());
    assert!(a.exists());
    assert!(b.exists());

    // The slot is free for the next batch.
    worker
        .submit(BatchRequest::new(BatchKind::Copy, vec![b], temp.path().join("dest")))
        .unwrap();
    loop {
        if let WorkerMessage::BatchDone(report) = next_message(&mut rx).await {
            assert_eq!(report.applied, 1);
            break;
        }
    }
    assert!(temp.path().join("dest/b.txt").exists());
}

#[tokio::test]
async fn test_cancel_before_first_item() {
    let temp = TempDir::new().unwrap();
    let sources = vec![
        write(temp.path().join("a.txt"), "a"),
        write(temp.path().join("b.txt"), "b"),
    ];
    let dest = temp.path().join("dest");
    fs::create_dir(&dest).unwrap();

    let (mut worker, mut rx) = BatchWorker::new(Arc::new(LocalFs), OpsConfig::default());
    worker
        .submit(BatchRequest::new(BatchKind::Copy, sources, &dest))
        .unwrap();
    worker.cancel();

    let WorkerMessage::BatchDone(report) = next_message(&mut rx).await else {
        panic!("expected the batch to end");
    };
    assert!(report.cancelled);
    assert_eq!(report.remaining, 2);
    assert_eq!(report.applied, 0);
    assert!(!dest.join("a.txt").exists());
}
