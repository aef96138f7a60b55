//! Commit-driven checkpoint scheduling service.
//!
//! A [`CheckpointScheduler`] ties together one delay queue, the commit-size
//! trigger feeding it, and the single maintenance worker draining it. The
//! process normally uses [`CheckpointScheduler::global`]; tests build isolated
//! instances with [`CheckpointScheduler::new`] and tear them down with
//! [`CheckpointScheduler::shutdown`].
//!
//! The worker thread is spawned lazily by the first commit that schedules a
//! checkpoint, exactly once per scheduler.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};
use walkeeper_error::Result;
use walkeeper_queue::DelayQueue;

use crate::handle::Handle;
use crate::metrics::SchedulerMetrics;
use crate::registry::{DatabaseRegistry, DatabaseResolver};
use crate::trigger::{CheckpointTrigger, DEFAULT_PAGE_THRESHOLD};
use crate::worker::MaintenanceWorker;

const DEFAULT_THREAD_NAME: &str = "walkeeper-checkpoint";

/// Configuration for commit-triggered checkpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointConfig {
    /// Quiet period after the last qualifying commit before checkpointing.
    ///
    /// Default: 2s.
    pub delay: Duration,

    /// Commits changing more than this many pages schedule a checkpoint.
    ///
    /// Default: 1000 pages.
    pub page_threshold: u32,

    /// Name of the maintenance thread.
    pub thread_name: String,
}

impl CheckpointConfig {
    /// Upper bound on [`Self::delay`]; larger values are clamped.
    pub const MAX_DELAY: Duration = Duration::from_secs(600);

    /// Validate and clamp configuration values.
    #[must_use]
    pub fn validated(mut self) -> Self {
        if self.delay > Self::MAX_DELAY {
            self.delay = Self::MAX_DELAY;
        }
        if self.thread_name.trim().is_empty() {
            DEFAULT_THREAD_NAME.clone_into(&mut self.thread_name);
        }
        self
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            page_threshold: DEFAULT_PAGE_THRESHOLD,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

/// Process-level checkpoint scheduler: queue, trigger and worker.
pub struct CheckpointScheduler {
    config: CheckpointConfig,
    queue: Arc<DelayQueue<PathBuf>>,
    trigger: CheckpointTrigger,
    resolver: Arc<dyn DatabaseResolver>,
    metrics: Arc<SchedulerMetrics>,
    worker: OnceLock<MaintenanceWorker>,
    spawn_lock: Mutex<()>,
}

impl CheckpointScheduler {
    /// Build an isolated scheduler. No thread runs until the first
    /// qualifying commit.
    #[must_use]
    pub fn new(config: CheckpointConfig, resolver: Arc<dyn DatabaseResolver>) -> Arc<Self> {
        let config = config.validated();
        let queue = Arc::new(DelayQueue::new(config.delay));
        let metrics = Arc::new(SchedulerMetrics::new());
        let trigger = CheckpointTrigger::new(
            Arc::clone(&queue),
            Arc::clone(&metrics),
            config.page_threshold,
        );
        Arc::new(Self {
            config,
            queue,
            trigger,
            resolver,
            metrics,
            worker: OnceLock::new(),
            spawn_lock: Mutex::new(()),
        })
    }

    /// The process-wide scheduler, resolving paths through
    /// [`DatabaseRegistry::global`]. Never shut down.
    pub fn global() -> &'static Arc<Self> {
        static GLOBAL_SCHEDULER: OnceLock<Arc<CheckpointScheduler>> = OnceLock::new();
        GLOBAL_SCHEDULER.get_or_init(|| {
            let registry = Arc::clone(DatabaseRegistry::global());
            Self::new(CheckpointConfig::default(), registry)
        })
    }

    #[must_use]
    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    #[must_use]
    pub fn trigger(&self) -> &CheckpointTrigger {
        &self.trigger
    }

    #[must_use]
    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    /// The delay queue feeding the worker.
    #[must_use]
    pub fn queue(&self) -> &DelayQueue<PathBuf> {
        &self.queue
    }

    /// Number of databases waiting for a checkpoint.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether the maintenance thread has been started.
    #[must_use]
    pub fn is_worker_running(&self) -> bool {
        self.worker.get().is_some_and(|worker| !worker.is_stopped())
    }

    /// Report a commit of `pages` changed pages to `path`.
    ///
    /// Returns `true` if the database was (re)scheduled for a checkpoint.
    pub fn on_commit(&self, path: &Path, pages: u32) -> bool {
        let scheduled = self.trigger.on_commit(path, pages);
        if scheduled {
            self.ensure_worker();
        }
        scheduled
    }

    /// Install checkpoint scheduling on `handle` by registering its
    /// committed hook.
    pub fn install(self: &Arc<Self>, handle: &dyn Handle) {
        let scheduler = Arc::clone(self);
        handle.register_committed_hook(Box::new(move |path, pages| {
            scheduler.on_commit(path, pages);
        }));
        debug!(path = %handle.path().display(), "checkpoint scheduling installed");
    }

    /// Stop the worker and discard pending work. Idempotent.
    ///
    /// Later commits still pass through the trigger but schedule nothing.
    pub fn shutdown(&self) -> Result<()> {
        let _guard = self.spawn_lock.lock();
        self.queue.close();
        match self.worker.get() {
            Some(worker) => worker.stop(),
            None => Ok(()),
        }
    }

    fn ensure_worker(&self) {
        if self.worker.get().is_some() {
            return;
        }
        let _guard = self.spawn_lock.lock();
        if self.worker.get().is_some() || self.queue.is_closed() {
            return;
        }
        match MaintenanceWorker::spawn(
            Arc::clone(&self.queue),
            Arc::clone(&self.resolver),
            Arc::clone(&self.metrics),
            &self.config.thread_name,
        ) {
            Ok(worker) => {
                if let Err(rejected) = self.worker.set(worker) {
                    // Unreachable under the spawn lock. Dropping the extra
                    // worker closes the shared queue.
                    error!(thread = rejected.name(), "maintenance worker slot already filled");
                }
            }
            Err(err) => {
                // Entries stay queued; the next qualifying commit retries.
                error!(error = %err, "failed to start maintenance worker");
            }
        }
    }
}

impl std::fmt::Debug for CheckpointScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointScheduler")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .field("worker", &self.worker.get())
            .finish_non_exhaustive()
    }
}
