//! Checkpoint scheduling metrics.
//!
//! Counters are bumped by [`CheckpointTrigger`](crate::trigger::CheckpointTrigger)
//! on the commit path and by the maintenance worker after each attempt.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters for commit-triggered checkpoint activity.
pub struct SchedulerMetrics {
    /// Commits reported through the committed hook.
    pub commits_observed_total: AtomicU64,
    /// Commits large enough to requeue their database.
    pub commits_scheduled_total: AtomicU64,
    /// Expired keys handed to the worker.
    pub checkpoints_attempted_total: AtomicU64,
    /// Checkpoints that ran to completion.
    pub checkpoints_completed_total: AtomicU64,
    /// Expired keys with no open database behind them.
    pub checkpoints_skipped_total: AtomicU64,
    /// Lookups or checkpoints that returned an error.
    pub checkpoints_failed_total: AtomicU64,
    /// Attempts that panicked inside the resolver or handle.
    pub callback_panics_total: AtomicU64,
    /// Cumulative wall time of completed checkpoints in microseconds.
    pub checkpoint_duration_us_total: AtomicU64,
}

impl SchedulerMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            commits_observed_total: AtomicU64::new(0),
            commits_scheduled_total: AtomicU64::new(0),
            checkpoints_attempted_total: AtomicU64::new(0),
            checkpoints_completed_total: AtomicU64::new(0),
            checkpoints_skipped_total: AtomicU64::new(0),
            checkpoints_failed_total: AtomicU64::new(0),
            callback_panics_total: AtomicU64::new(0),
            checkpoint_duration_us_total: AtomicU64::new(0),
        }
    }

    pub fn record_commit(&self, scheduled: bool) {
        self.commits_observed_total.fetch_add(1, Ordering::Relaxed);
        if scheduled {
            self.commits_scheduled_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_attempt(&self) {
        self.checkpoints_attempted_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, duration_us: u64) {
        self.checkpoints_completed_total
            .fetch_add(1, Ordering::Relaxed);
        self.checkpoint_duration_us_total
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.checkpoints_skipped_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.checkpoints_failed_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// A panic is also counted as a failure.
    pub fn record_panic(&self) {
        self.callback_panics_total.fetch_add(1, Ordering::Relaxed);
        self.record_failed();
    }

    /// Take a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        SchedulerMetricsSnapshot {
            commits_observed_total: self.commits_observed_total.load(Ordering::Relaxed),
            commits_scheduled_total: self.commits_scheduled_total.load(Ordering::Relaxed),
            checkpoints_attempted_total: self.checkpoints_attempted_total.load(Ordering::Relaxed),
            checkpoints_completed_total: self.checkpoints_completed_total.load(Ordering::Relaxed),
            checkpoints_skipped_total: self.checkpoints_skipped_total.load(Ordering::Relaxed),
            checkpoints_failed_total: self.checkpoints_failed_total.load(Ordering::Relaxed),
            callback_panics_total: self.callback_panics_total.load(Ordering::Relaxed),
            checkpoint_duration_us_total: self
                .checkpoint_duration_us_total
                .load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.commits_observed_total.store(0, Ordering::Relaxed);
        self.commits_scheduled_total.store(0, Ordering::Relaxed);
        self.checkpoints_attempted_total.store(0, Ordering::Relaxed);
        self.checkpoints_completed_total.store(0, Ordering::Relaxed);
        self.checkpoints_skipped_total.store(0, Ordering::Relaxed);
        self.checkpoints_failed_total.store(0, Ordering::Relaxed);
        self.callback_panics_total.store(0, Ordering::Relaxed);
        self.checkpoint_duration_us_total
            .store(0, Ordering::Relaxed);
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SchedulerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.snapshot(), f)
    }
}

/// Point-in-time snapshot of scheduler metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerMetricsSnapshot {
    pub commits_observed_total: u64,
    pub commits_scheduled_total: u64,
    pub checkpoints_attempted_total: u64,
    pub checkpoints_completed_total: u64,
    pub checkpoints_skipped_total: u64,
    pub checkpoints_failed_total: u64,
    pub callback_panics_total: u64,
    pub checkpoint_duration_us_total: u64,
}

impl SchedulerMetricsSnapshot {
    /// Average completed checkpoint duration in microseconds, or 0.
    #[must_use]
    pub fn avg_checkpoint_duration_us(&self) -> u64 {
        self.checkpoint_duration_us_total
            .checked_div(self.checkpoints_completed_total)
            .unwrap_or(0)
    }
}

impl fmt::Display for SchedulerMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commits={} scheduled={} ckpt_attempted={} ckpt_completed={} \
             ckpt_skipped={} ckpt_failed={} panics={} avg_ckpt_us={}",
            self.commits_observed_total,
            self.commits_scheduled_total,
            self.checkpoints_attempted_total,
            self.checkpoints_completed_total,
            self.checkpoints_skipped_total,
            self.checkpoints_failed_total,
            self.callback_panics_total,
            self.avg_checkpoint_duration_us(),
        )
    }
}

/// Saturating conversion of a `Duration` to whole microseconds.
pub(crate) fn duration_us_saturating(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
