//! The maintenance thread: sole consumer of the checkpoint delay queue.
//!
//! Each expired path becomes one best-effort checkpoint attempt. Nothing an
//! attempt does can escape the loop: lookup errors, checkpoint errors and
//! panics are logged, counted, and dropped. A failed key is not retried; it
//! comes back only when a later commit requeues it.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use walkeeper_error::{Result, WalKeeperError};
use walkeeper_queue::{DelayQueue, WaitOutcome};

use crate::handle::{Pragma, PragmaStatement};
use crate::metrics::{SchedulerMetrics, duration_us_saturating};
use crate::registry::DatabaseResolver;

/// Result of one checkpoint attempt.
#[derive(Debug)]
pub enum CheckpointOutcome {
    /// The checkpoint pragma ran without error.
    Completed,
    /// No database is open for the path; nothing to do.
    Skipped,
    /// Lookup or checkpoint failed. Already logged.
    Failed(WalKeeperError),
}

impl CheckpointOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Checkpoint the database at `path` if one is already open.
///
/// Never returns an error: failures come back as
/// [`CheckpointOutcome::Failed`] after being logged and counted.
pub fn attempt_checkpoint(
    resolver: &dyn DatabaseResolver,
    path: &Path,
    metrics: &SchedulerMetrics,
) -> CheckpointOutcome {
    metrics.record_attempt();
    let started = Instant::now();

    let handle = match resolver.open_existing(path) {
        Ok(Some(handle)) => handle,
        Ok(None) => {
            metrics.record_skipped();
            debug!(path = %path.display(), "checkpoint skipped: database not open");
            return CheckpointOutcome::Skipped;
        }
        Err(err) => {
            metrics.record_failed();
            warn!(path = %path.display(), error = %err, "checkpoint lookup failed");
            return CheckpointOutcome::Failed(err);
        }
    };

    match handle.exec(&PragmaStatement::get(Pragma::WalCheckpoint)) {
        Ok(()) => {
            let duration_us = duration_us_saturating(started.elapsed());
            metrics.record_completed(duration_us);
            info!(path = %path.display(), duration_us, "background checkpoint complete");
            CheckpointOutcome::Completed
        }
        Err(err) => {
            metrics.record_failed();
            warn!(path = %path.display(), error = %err, "background checkpoint failed");
            CheckpointOutcome::Failed(err)
        }
    }
}

/// Handle to the running maintenance thread.
///
/// The thread runs until [`MaintenanceWorker::stop`] closes its queue. In
/// production the process-wide worker is never stopped.
pub struct MaintenanceWorker {
    name: String,
    queue: Arc<DelayQueue<PathBuf>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceWorker {
    /// Start the maintenance thread consuming `queue`.
    pub fn spawn(
        queue: Arc<DelayQueue<PathBuf>>,
        resolver: Arc<dyn DatabaseResolver>,
        metrics: Arc<SchedulerMetrics>,
        thread_name: &str,
    ) -> Result<Self> {
        let worker_queue = Arc::clone(&queue);
        let worker_name = thread_name.to_owned();
        let thread = thread::Builder::new()
            .name(thread_name.to_owned())
            .spawn(move || run_loop(&worker_queue, resolver.as_ref(), &metrics, &worker_name))
            .map_err(|source| WalKeeperError::WorkerSpawn {
                name: thread_name.to_owned(),
                source,
            })?;

        info!(thread = thread_name, "maintenance worker started");
        Ok(Self {
            name: thread_name.to_owned(),
            queue,
            thread: Mutex::new(Some(thread)),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread has been joined.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.thread.lock().is_none()
    }

    /// Close the queue and join the thread. Idempotent.
    ///
    /// An attempt already in progress runs to completion first; pending
    /// entries are discarded.
    pub fn stop(&self) -> Result<()> {
        self.queue.close();
        let thread = {
            let mut slot = self.thread.lock();
            if slot
                .as_ref()
                .is_some_and(|thread| thread.thread().id() == thread::current().id())
            {
                return Err(WalKeeperError::internal(
                    "maintenance worker cannot join itself",
                ));
            }
            match slot.take() {
                Some(thread) => thread,
                None => return Ok(()),
            }
        };
        thread.join().map_err(|_| WalKeeperError::WorkerPanicked {
            name: self.name.clone(),
        })?;
        info!(thread = %self.name, "maintenance worker stopped");
        Ok(())
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!(thread = %self.name, error = %err, "maintenance worker stop failed during drop");
        }
    }
}

impl std::fmt::Debug for MaintenanceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceWorker")
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

fn run_loop(
    queue: &DelayQueue<PathBuf>,
    resolver: &dyn DatabaseResolver,
    metrics: &SchedulerMetrics,
    name: &str,
) {
    loop {
        let outcome = queue.wait_until_expired(|path| {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
                attempt_checkpoint(resolver, &path, metrics)
            }));
            if attempt.is_err() {
                metrics.record_panic();
                error!(
                    thread = name,
                    path = %path.display(),
                    "checkpoint attempt panicked; maintenance loop continues"
                );
            }
        });
        if outcome == WaitOutcome::Closed {
            debug!(thread = name, "maintenance loop exiting: queue closed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{CommittedHook, Handle, PerformanceTrace, SqlTrace};
    use std::time::Duration;

    struct FailingHandle {
        path: PathBuf,
    }

    impl Handle for FailingHandle {
        fn path(&self) -> &Path {
            &self.path
        }
        fn is_readonly(&self) -> bool {
            false
        }
        fn query_pragma(&self, _pragma: Pragma) -> Result<String> {
            Ok(String::new())
        }
        fn exec(&self, _statement: &PragmaStatement) -> Result<()> {
            Err(WalKeeperError::DatabaseLocked {
                path: self.path.clone(),
            })
        }
        fn register_committed_hook(&self, _hook: CommittedHook) {}
        fn set_cipher_key(&self, _key: &[u8]) -> Result<()> {
            Ok(())
        }
        fn set_sql_trace(&self, _trace: SqlTrace) {}
        fn set_performance_trace(&self, _trace: PerformanceTrace) {}
    }

    struct FixedResolver(Option<Arc<dyn Handle>>);

    impl DatabaseResolver for FixedResolver {
        fn open_existing(&self, _path: &Path) -> Result<Option<Arc<dyn Handle>>> {
            Ok(self.0.clone())
        }
    }

    struct ErrResolver;

    impl DatabaseResolver for ErrResolver {
        fn open_existing(&self, path: &Path) -> Result<Option<Arc<dyn Handle>>> {
            Err(WalKeeperError::DatabaseNotFound {
                path: path.to_path_buf(),
            })
        }
    }

    struct PanicResolver;

    impl DatabaseResolver for PanicResolver {
        fn open_existing(&self, _path: &Path) -> Result<Option<Arc<dyn Handle>>> {
            panic!("resolver exploded");
        }
    }

    type WorkerSlot = Arc<std::sync::OnceLock<Arc<MaintenanceWorker>>>;

    /// Calls `stop` on its own worker from inside the maintenance thread.
    struct SelfStopResolver {
        worker: WorkerSlot,
        seen: std::sync::mpsc::Sender<(bool, bool)>,
    }

    impl DatabaseResolver for SelfStopResolver {
        fn open_existing(&self, _path: &Path) -> Result<Option<Arc<dyn Handle>>> {
            if let Some(worker) = self.worker.get() {
                let refused = matches!(worker.stop(), Err(WalKeeperError::Internal(_)));
                let _ = self.seen.send((refused, worker.is_stopped()));
            }
            Ok(None)
        }
    }

    #[test]
    fn test_attempt_skips_missing_database() {
        let metrics = SchedulerMetrics::new();
        let outcome = attempt_checkpoint(&FixedResolver(None), Path::new("/a.db"), &metrics);
        assert!(matches!(outcome, CheckpointOutcome::Skipped));
        let snap = metrics.snapshot();
        assert_eq!(snap.checkpoints_attempted_total, 1);
        assert_eq!(snap.checkpoints_skipped_total, 1);
        assert_eq!(snap.checkpoints_failed_total, 0);
    }

    #[test]
    fn test_attempt_reports_checkpoint_failure() {
        let metrics = SchedulerMetrics::new();
        let handle: Arc<dyn Handle> = Arc::new(FailingHandle {
            path: PathBuf::from("/a.db"),
        });
        let outcome =
            attempt_checkpoint(&FixedResolver(Some(handle)), Path::new("/a.db"), &metrics);
        assert!(matches!(
            outcome,
            CheckpointOutcome::Failed(WalKeeperError::DatabaseLocked { .. })
        ));
        assert_eq!(metrics.snapshot().checkpoints_failed_total, 1);
    }

    #[test]
    fn test_attempt_reports_lookup_failure() {
        let metrics = SchedulerMetrics::new();
        let outcome = attempt_checkpoint(&ErrResolver, Path::new("/a.db"), &metrics);
        assert!(matches!(outcome, CheckpointOutcome::Failed(_)));
        assert!(!outcome.is_completed());
    }

    #[test]
    fn test_worker_survives_panicking_resolver() {
        let queue = Arc::new(DelayQueue::new(Duration::from_millis(5)));
        let metrics = Arc::new(SchedulerMetrics::new());
        let worker = MaintenanceWorker::spawn(
            Arc::clone(&queue),
            Arc::new(PanicResolver),
            Arc::clone(&metrics),
            "walkeeper-test-panic",
        )
        .expect("spawn worker");

        queue.requeue(PathBuf::from("/a.db"));
        queue.requeue(PathBuf::from("/b.db"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while metrics.snapshot().callback_panics_total < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(metrics.snapshot().callback_panics_total, 2);
        assert!(!worker.is_stopped());
        worker.stop().expect("clean stop after panics");
        assert!(worker.is_stopped());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let queue = Arc::new(DelayQueue::new(Duration::from_secs(60)));
        let worker = MaintenanceWorker::spawn(
            Arc::clone(&queue),
            Arc::new(FixedResolver(None)),
            Arc::new(SchedulerMetrics::new()),
            "walkeeper-test-stop",
        )
        .expect("spawn worker");
        assert_eq!(worker.name(), "walkeeper-test-stop");
        worker.stop().expect("first stop");
        worker.stop().expect("second stop");
        assert!(queue.is_closed());
    }

    #[test]
    fn test_stop_from_worker_thread_keeps_handle() {
        let queue = Arc::new(DelayQueue::new(Duration::from_millis(5)));
        let slot: WorkerSlot = Arc::default();
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = Arc::new(
            MaintenanceWorker::spawn(
                Arc::clone(&queue),
                Arc::new(SelfStopResolver {
                    worker: Arc::clone(&slot),
                    seen: tx,
                }),
                Arc::new(SchedulerMetrics::new()),
                "walkeeper-test-self-stop",
            )
            .expect("spawn worker"),
        );
        assert!(slot.set(Arc::clone(&worker)).is_ok());

        assert!(queue.requeue(PathBuf::from("/a.db")));
        let (refused, stopped) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("resolver ran on the worker thread");
        assert!(refused, "self-join is refused");
        assert!(!stopped, "handle stays in place while the thread runs");

        worker.stop().expect("join from the owning thread");
        assert!(worker.is_stopped());
    }
}
