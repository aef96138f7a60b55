//! Commit-triggered background WAL checkpoints and handle configuration.
//!
//! Large commits requeue their database into a debouncing delay queue; a
//! single maintenance thread checkpoints each database once writes to it
//! have been quiet for the configured delay.

pub mod builtin;
pub mod config;
pub mod handle;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod trigger;
pub mod worker;

pub use builtin::{
    basic, checkpoint, cipher_with_key, default_configs, set_global_performance_trace,
    set_global_sql_trace, trace,
};
pub use config::{Config, ConfigFn, ConfigOrder, Configs};
pub use handle::{CommittedHook, Handle, PerformanceTrace, Pragma, PragmaStatement, SqlTrace};
pub use metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
pub use registry::{DatabaseRegistry, DatabaseResolver};
pub use scheduler::{CheckpointConfig, CheckpointScheduler};
pub use trigger::{CheckpointTrigger, DEFAULT_PAGE_THRESHOLD};
pub use worker::{CheckpointOutcome, MaintenanceWorker, attempt_checkpoint};
