//! Debouncing delay queue used to schedule background maintenance.
//!
//! [`Schedule`] is the clock-injected bookkeeping; [`DelayQueue`] wraps it in
//! a mutex and condvar for many producers and a single blocking consumer.

pub mod delay_queue;
pub mod metrics;
pub mod schedule;

pub use delay_queue::{DelayQueue, WaitOutcome};
pub use metrics::{QueueMetrics, QueueMetricsSnapshot};
pub use schedule::{RequeueOutcome, Schedule};
