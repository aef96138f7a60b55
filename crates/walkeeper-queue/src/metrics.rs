//! Delay queue counters.
//!
//! One [`QueueMetrics`] lives inside each [`DelayQueue`](crate::DelayQueue),
//! so isolated queues in tests never share counts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking requeue and expiry activity.
pub struct QueueMetrics {
    /// Total `requeue` calls accepted while the queue was open.
    pub requeues_total: AtomicU64,
    /// Requeues that created a new pending entry.
    pub inserted_total: AtomicU64,
    /// Requeues that replaced the deadline of an already pending entry.
    pub coalesced_total: AtomicU64,
    /// Entries popped and handed to the consumer callback.
    pub expired_total: AtomicU64,
    /// Requeues that moved the earliest deadline and woke the consumer.
    pub head_wakeups_total: AtomicU64,
}

impl QueueMetrics {
    /// Create zeroed metrics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requeues_total: AtomicU64::new(0),
            inserted_total: AtomicU64::new(0),
            coalesced_total: AtomicU64::new(0),
            expired_total: AtomicU64::new(0),
            head_wakeups_total: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_requeue(&self, coalesced: bool, head_changed: bool) {
        self.requeues_total.fetch_add(1, Ordering::Relaxed);
        if coalesced {
            self.coalesced_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inserted_total.fetch_add(1, Ordering::Relaxed);
        }
        if head_changed {
            self.head_wakeups_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_expired(&self) {
        self.expired_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            requeues_total: self.requeues_total.load(Ordering::Relaxed),
            inserted_total: self.inserted_total.load(Ordering::Relaxed),
            coalesced_total: self.coalesced_total.load(Ordering::Relaxed),
            expired_total: self.expired_total.load(Ordering::Relaxed),
            head_wakeups_total: self.head_wakeups_total.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.requeues_total.store(0, Ordering::Relaxed);
        self.inserted_total.store(0, Ordering::Relaxed);
        self.coalesced_total.store(0, Ordering::Relaxed);
        self.expired_total.store(0, Ordering::Relaxed);
        self.head_wakeups_total.store(0, Ordering::Relaxed);
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueueMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.snapshot(), f)
    }
}

/// Point-in-time snapshot of queue metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueMetricsSnapshot {
    pub requeues_total: u64,
    pub inserted_total: u64,
    pub coalesced_total: u64,
    pub expired_total: u64,
    pub head_wakeups_total: u64,
}

impl QueueMetricsSnapshot {
    /// Requeues absorbed into an existing entry per entry that expired, or 0
    /// if nothing has expired yet.
    #[must_use]
    pub fn coalesce_ratio(&self) -> u64 {
        self.coalesced_total
            .checked_div(self.expired_total)
            .unwrap_or(0)
    }
}

impl fmt::Display for QueueMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requeues={} inserted={} coalesced={} expired={} head_wakeups={}",
            self.requeues_total,
            self.inserted_total,
            self.coalesced_total,
            self.expired_total,
            self.head_wakeups_total,
        )
    }
}
