//! Thread-safe debouncing delay queue.
//!
//! Any number of producers call [`DelayQueue::requeue`]; exactly one consumer
//! loops on [`DelayQueue::wait_until_expired`]. A key requeued while pending
//! has its deadline pushed out to `now + delay`, so a burst of requeues for
//! one key yields a single expiry `delay` after the last of them.
//!
//! The mutex guards bookkeeping only. The consumer callback always runs with
//! the lock released, so it may requeue (including its own key) freely.

use std::fmt;
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::metrics::QueueMetrics;
use crate::schedule::Schedule;

/// How a consumer wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// An entry expired, was removed, and the callback ran.
    Fired,
    /// The caller's timeout elapsed before any entry expired.
    TimedOut,
    /// The queue was closed; no further entries will be delivered.
    Closed,
}

#[derive(Debug)]
struct QueueState<K> {
    schedule: Schedule<K>,
    closed: bool,
}

/// Keyed delay queue with last-write-wins requeue and one blocking consumer.
#[derive(Debug)]
pub struct DelayQueue<K> {
    state: Mutex<QueueState<K>>,
    cv: Condvar,
    metrics: QueueMetrics,
}

impl<K> DelayQueue<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create an empty queue; every entry expires `delay` after its last
    /// requeue.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState {
                schedule: Schedule::new(delay),
                closed: false,
            }),
            cv: Condvar::new(),
            metrics: QueueMetrics::new(),
        }
    }

    /// The fixed delay applied to every requeue.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.lock_state().schedule.delay()
    }

    /// Schedule `key` to expire `delay` from now, replacing any pending
    /// deadline it already has.
    ///
    /// Never blocks beyond the bookkeeping lock. Returns `false`, recording
    /// nothing, once [`Self::close`] has run.
    pub fn requeue(&self, key: K) -> bool {
        let outcome = {
            let mut state = self.lock_state();
            if state.closed {
                trace!(key = ?key, "requeue ignored: delay queue closed");
                return false;
            }
            state.schedule.requeue(key.clone(), Instant::now())
        };

        self.metrics
            .record_requeue(outcome.coalesced, outcome.head_changed);
        if outcome.head_changed {
            self.cv.notify_all();
        }
        trace!(
            key = ?key,
            coalesced = outcome.coalesced,
            head_changed = outcome.head_changed,
            "delay queue requeue"
        );
        true
    }

    /// Block until the earliest entry reaches its deadline, remove it, and
    /// pass its key to `on_expire` with the lock released.
    ///
    /// Blocks indefinitely on an empty queue. Returns [`WaitOutcome::Closed`]
    /// once the queue is closed; otherwise always [`WaitOutcome::Fired`].
    pub fn wait_until_expired<F>(&self, on_expire: F) -> WaitOutcome
    where
        F: FnOnce(K),
    {
        self.wait_inner(None, on_expire)
    }

    /// Like [`Self::wait_until_expired`], but gives up after `timeout`.
    pub fn try_wait_until_expired<F>(&self, timeout: Duration, on_expire: F) -> WaitOutcome
    where
        F: FnOnce(K),
    {
        self.wait_inner(Instant::now().checked_add(timeout), on_expire)
    }

    /// Close the queue: wake the consumer, drop pending entries, and turn
    /// later requeues into no-ops.
    pub fn close(&self) {
        let dropped = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.schedule.clear()
        };
        self.cv.notify_all();
        debug!(dropped_entries = dropped, "delay queue closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Number of pending keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().schedule.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_state().schedule.is_empty()
    }

    /// Deadline currently pending for `key`.
    #[must_use]
    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.lock_state().schedule.deadline(key)
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock_state().schedule.next_deadline()
    }

    #[must_use]
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    fn wait_inner<F>(&self, limit: Option<Instant>, on_expire: F) -> WaitOutcome
    where
        F: FnOnce(K),
    {
        let mut state = self.lock_state();
        let key = loop {
            if state.closed {
                return WaitOutcome::Closed;
            }

            let now = Instant::now();
            if let Some(key) = state.schedule.pop_expired(now) {
                break key;
            }
            if limit.is_some_and(|limit| now >= limit) {
                return WaitOutcome::TimedOut;
            }

            // Re-read the head on every pass: a producer may have tightened
            // it while we slept.
            let wake_at = match (state.schedule.next_deadline(), limit) {
                (Some(deadline), Some(limit)) => Some(deadline.min(limit)),
                (Some(deadline), None) => Some(deadline),
                (None, limit) => limit,
            };

            state = match wake_at {
                None => match self.cv.wait(state) {
                    Ok(next) => next,
                    Err(poisoned) => poisoned.into_inner(),
                },
                Some(at) => {
                    let timeout = at.saturating_duration_since(now);
                    match self.cv.wait_timeout(state, timeout) {
                        Ok((next, _)) => next,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
            };
        };
        drop(state);

        self.metrics.record_expired();
        debug!(key = ?key, "delay queue entry expired");
        on_expire(key);
        WaitOutcome::Fired
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState<K>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(lock = "delay_queue_state", "mutex poisoned; recovering inner state");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    const DELAY: Duration = Duration::from_millis(60);

    #[test]
    fn test_try_wait_times_out_on_empty_queue() {
        let queue: DelayQueue<&str> = DelayQueue::new(DELAY);
        let started = Instant::now();
        let outcome = queue.try_wait_until_expired(Duration::from_millis(20), |_| {
            panic!("nothing is queued")
        });
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_never_fires_before_deadline() {
        let queue = DelayQueue::new(DELAY);
        let requeued_at = Instant::now();
        queue.requeue("a");
        let mut fired = None;
        let outcome = queue.wait_until_expired(|key| fired = Some((key, Instant::now())));
        assert_eq!(outcome, WaitOutcome::Fired);
        let (key, at) = fired.expect("callback ran");
        assert_eq!(key, "a");
        assert!(at.duration_since(requeued_at) >= DELAY);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_wait_short_timeout_leaves_entry_pending() {
        let queue = DelayQueue::new(Duration::from_secs(5));
        queue.requeue("a");
        let outcome = queue.try_wait_until_expired(Duration::from_millis(10), |_| {
            panic!("deadline is far away")
        });
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_callback_may_requeue_its_own_key() {
        let queue = DelayQueue::new(Duration::from_millis(10));
        queue.requeue("a");
        let outcome = queue.wait_until_expired(|key| {
            assert!(queue.requeue(key));
        });
        assert_eq!(outcome, WaitOutcome::Fired);
        assert_eq!(queue.len(), 1, "requeue from the callback is a fresh insert");
        assert_eq!(queue.metrics().snapshot().inserted_total, 2);
    }

    #[test]
    fn test_close_wakes_idle_consumer() {
        let queue: Arc<DelayQueue<u32>> = Arc::new(DelayQueue::new(DELAY));
        let (tx, rx) = mpsc::channel();
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let outcome = queue.wait_until_expired(|_| {});
                tx.send(outcome).expect("send outcome");
            })
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        let outcome = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("consumer woke after close");
        assert_eq!(outcome, WaitOutcome::Closed);
        consumer.join().expect("consumer thread");
    }

    #[test]
    fn test_close_discards_pending_and_ignores_requeue() {
        let queue = DelayQueue::new(DELAY);
        queue.requeue(1_u32);
        queue.requeue(2_u32);
        queue.close();
        assert!(queue.is_closed());
        assert!(queue.is_empty());
        assert!(!queue.requeue(3_u32));
        assert!(queue.is_empty());
        assert_eq!(queue.metrics().snapshot().requeues_total, 2);
        assert_eq!(
            queue.try_wait_until_expired(Duration::from_millis(5), |_| {}),
            WaitOutcome::Closed
        );
    }

    #[test]
    fn test_requeue_metrics_count_coalesced_burst() {
        let queue = DelayQueue::new(DELAY);
        for _ in 0..5 {
            queue.requeue("a");
        }
        let snap = queue.metrics().snapshot();
        assert_eq!(snap.requeues_total, 5);
        assert_eq!(snap.inserted_total, 1);
        assert_eq!(snap.coalesced_total, 4);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_oversized_delay_does_not_fire_immediately() {
        let queue = DelayQueue::new(Duration::MAX);
        assert!(queue.requeue("a"));
        let outcome = queue.try_wait_until_expired(Duration::from_millis(50), |key| {
            panic!("{key} fired before its deadline")
        });
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_poisoned_state_is_recovered() {
        let queue: Arc<DelayQueue<&str>> = Arc::new(DelayQueue::new(Duration::from_millis(10)));
        assert!(queue.requeue("a"));
        let poisoner = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let _guard = queue.state.lock();
                panic!("poison the delay queue lock");
            })
        };
        assert!(poisoner.join().is_err());
        assert!(queue.state.is_poisoned());

        assert_eq!(queue.len(), 1, "pending entry survives the poisoning");
        assert!(queue.requeue("b"));
        let mut fired = Vec::new();
        for _ in 0..2 {
            let outcome = queue.wait_until_expired(|key| fired.push(key));
            assert_eq!(outcome, WaitOutcome::Fired);
        }
        assert_eq!(fired, vec!["a", "b"]);
        queue.close();
        assert!(queue.is_closed());
    }
}
