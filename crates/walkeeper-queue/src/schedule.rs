//! Clock-injected deadline bookkeeping behind [`DelayQueue`](crate::DelayQueue).
//!
//! A [`Schedule`] holds at most one deadline per key. Every operation takes
//! `now` explicitly, so the ordering and coalescing rules can be exercised
//! without sleeping.
//!
//! Two indexes are kept in lockstep:
//! - `slots`: key to its current `(deadline, seq)`.
//! - `order`: `(deadline, seq)` to key, ascending.
//!
//! `seq` is a monotonic counter assigned on every requeue. It breaks ties
//! between equal deadlines so they pop in requeue order.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Result of a single [`Schedule::requeue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueOutcome {
    /// The deadline now recorded for the key.
    pub deadline: Instant,
    /// `true` if the key was already pending and its deadline was replaced.
    pub coalesced: bool,
    /// `true` if the earliest pending entry changed as a result.
    pub head_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    deadline: Instant,
    seq: u64,
}

/// Keyed deadlines with a fixed delay and last-write-wins requeue.
#[derive(Debug)]
pub struct Schedule<K> {
    delay: Duration,
    slots: HashMap<K, Slot>,
    order: BTreeMap<(Instant, u64), K>,
    next_seq: u64,
}

impl<K> Schedule<K>
where
    K: Eq + Hash + Clone,
{
    /// Longest delay a schedule honors; larger values are clamped.
    ///
    /// A deadline this far out never comes due in a running process.
    pub const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

    /// Create an empty schedule whose entries expire `delay` after requeue.
    ///
    /// `delay` is clamped to [`Self::MAX_DELAY`].
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: delay.min(Self::MAX_DELAY),
            slots: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// The fixed delay applied to every requeue.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Insert `key` with deadline `now + delay`, or replace its deadline if
    /// it is already pending.
    pub fn requeue(&mut self, key: K, now: Instant) -> RequeueOutcome {
        let head_before = self.head_key_slot();
        let deadline = far_deadline(now, self.delay);
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let slot = Slot { deadline, seq };
        let coalesced = match self.slots.insert(key.clone(), slot) {
            Some(previous) => {
                self.order.remove(&(previous.deadline, previous.seq));
                true
            }
            None => false,
        };
        self.order.insert((deadline, seq), key);

        RequeueOutcome {
            deadline,
            coalesced,
            head_changed: head_before != self.head_key_slot(),
        }
    }

    /// Remove and return the earliest entry if its deadline is at or before
    /// `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<K> {
        let entry = self.order.first_entry()?;
        if entry.key().0 > now {
            return None;
        }
        let key = entry.remove();
        self.slots.remove(&key);
        Some(key)
    }

    /// Deadline of the earliest pending entry.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.order.keys().next().map(|&(deadline, _)| deadline)
    }

    /// Deadline currently recorded for `key`, if pending.
    #[must_use]
    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.slots.get(key).map(|slot| slot.deadline)
    }

    /// Whether `key` is pending.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of pending keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every pending entry, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.slots.len();
        self.slots.clear();
        self.order.clear();
        dropped
    }

    fn head_key_slot(&self) -> Option<(Instant, u64)> {
        self.order.keys().next().copied()
    }
}

/// `now + delay`, halving `delay` until the sum is representable.
fn far_deadline(now: Instant, delay: Duration) -> Instant {
    let mut delay = delay;
    loop {
        if let Some(deadline) = now.checked_add(delay) {
            return deadline;
        }
        if delay.is_zero() {
            return now;
        }
        delay /= 2;
    }
}
