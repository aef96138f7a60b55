//! Commit-size policy that decides when a database needs a checkpoint.
//!
//! Runs inside the committed hook, on the committing thread, so it does no
//! more than one comparison and one queue update.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::trace;
use walkeeper_queue::DelayQueue;

use crate::metrics::SchedulerMetrics;

/// Commits touching more than this many pages schedule a checkpoint.
pub const DEFAULT_PAGE_THRESHOLD: u32 = 1000;

/// Requeues a database path when a commit changes more pages than the
/// threshold.
#[derive(Debug, Clone)]
pub struct CheckpointTrigger {
    queue: Arc<DelayQueue<PathBuf>>,
    metrics: Arc<SchedulerMetrics>,
    page_threshold: u32,
}

impl CheckpointTrigger {
    #[must_use]
    pub fn new(
        queue: Arc<DelayQueue<PathBuf>>,
        metrics: Arc<SchedulerMetrics>,
        page_threshold: u32,
    ) -> Self {
        Self {
            queue,
            metrics,
            page_threshold,
        }
    }

    #[must_use]
    pub fn page_threshold(&self) -> u32 {
        self.page_threshold
    }

    /// Whether a commit of `pages` changed pages qualifies.
    #[must_use]
    pub fn qualifies(&self, pages: u32) -> bool {
        pages > self.page_threshold
    }

    /// Evaluate one commit. Returns `true` if `path` was requeued; a
    /// qualifying commit against a closed queue returns `false`.
    pub fn on_commit(&self, path: &Path, pages: u32) -> bool {
        let scheduled = self.qualifies(pages) && self.queue.requeue(path.to_path_buf());
        self.metrics.record_commit(scheduled);
        if scheduled {
            trace!(path = %path.display(), pages, "checkpoint requeued after large commit");
        }
        scheduled
    }
}
