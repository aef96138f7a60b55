//! Builtin configuration steps and the default chain.

use std::sync::Arc;

use parking_lot::{RwLock, const_rwlock};
use tracing::{debug, error};
use walkeeper_error::{Result, WalKeeperError};

use crate::config::{Config, ConfigOrder, Configs};
use crate::handle::{Handle, PerformanceTrace, Pragma, PragmaStatement, SqlTrace};
use crate::scheduler::CheckpointScheduler;

pub const BASIC_CONFIG_NAME: &str = "basic";
pub const TRACE_CONFIG_NAME: &str = "trace";
pub const CIPHER_CONFIG_NAME: &str = "cipher";
pub const CHECKPOINT_CONFIG_NAME: &str = "checkpoint";

static GLOBAL_SQL_TRACE: RwLock<Option<SqlTrace>> = const_rwlock(None);
static GLOBAL_PERFORMANCE_TRACE: RwLock<Option<PerformanceTrace>> = const_rwlock(None);

/// Install `trace` on every handle configured after this call. `None`
/// clears it.
pub fn set_global_sql_trace(trace: Option<SqlTrace>) {
    *GLOBAL_SQL_TRACE.write() = trace;
}

/// Install `trace` on every handle configured after this call. `None`
/// clears it.
pub fn set_global_performance_trace(trace: Option<PerformanceTrace>) {
    *GLOBAL_PERFORMANCE_TRACE.write() = trace;
}

/// Journal, locking and sync settings every handle needs.
///
/// Writable handles end up in WAL journal mode with normal locking, normal
/// synchronous and fullfsync on. A read-only handle is left untouched unless
/// its database is in WAL mode, which is fatal misuse.
#[must_use]
pub fn basic() -> Config {
    Config::new(BASIC_CONFIG_NAME, ConfigOrder::Basic.value(), apply_basic)
}

fn apply_basic(handle: &dyn Handle) -> Result<()> {
    if handle.is_readonly() {
        let journal_mode = handle.query_pragma(Pragma::JournalMode)?;
        if journal_mode.eq_ignore_ascii_case("wal") {
            let err = WalKeeperError::ReadOnlyWal {
                path: handle.path().to_path_buf(),
            };
            error!(path = %handle.path().display(), error = %err, "read-only handle on WAL database");
            return Err(err);
        }
        return Ok(());
    }

    let locking_mode = handle.query_pragma(Pragma::LockingMode)?;
    if !locking_mode.eq_ignore_ascii_case("normal") {
        handle.exec(&PragmaStatement::set(Pragma::LockingMode, "NORMAL"))?;
    }

    handle.exec(&PragmaStatement::set(Pragma::Synchronous, "NORMAL"))?;

    let journal_mode = handle.query_pragma(Pragma::JournalMode)?;
    if !journal_mode.eq_ignore_ascii_case("wal") {
        handle.exec(&PragmaStatement::set(Pragma::JournalMode, "WAL"))?;
    }

    handle.exec(&PragmaStatement::set_flag(Pragma::Fullfsync, true))?;
    Ok(())
}

/// Copies the global SQL and performance traces, when set, onto the handle.
#[must_use]
pub fn trace() -> Config {
    Config::new(TRACE_CONFIG_NAME, ConfigOrder::Trace.value(), |handle| {
        if let Some(trace) = GLOBAL_PERFORMANCE_TRACE.read().clone() {
            handle.set_performance_trace(trace);
        }
        if let Some(trace) = GLOBAL_SQL_TRACE.read().clone() {
            handle.set_sql_trace(trace);
        }
        Ok(())
    })
}

/// Installs an encryption key and cipher page size.
#[must_use]
pub fn cipher_with_key(key: &[u8], page_size: u32) -> Config {
    let key: Arc<[u8]> = Arc::from(key);
    Config::new(
        CIPHER_CONFIG_NAME,
        ConfigOrder::Cipher.value(),
        move |handle| {
            handle.set_cipher_key(&key)?;
            handle.exec(&PragmaStatement::set(Pragma::CipherPageSize, page_size))?;
            Ok(())
        },
    )
}

/// Wires the handle's committed hook to `scheduler`.
#[must_use]
pub fn checkpoint(scheduler: &Arc<CheckpointScheduler>) -> Config {
    let scheduler = Arc::clone(scheduler);
    Config::new(
        CHECKPOINT_CONFIG_NAME,
        ConfigOrder::Checkpoint.value(),
        move |handle| {
            scheduler.install(handle);
            Ok(())
        },
    )
}

/// `trace`, `basic`, and `checkpoint` against the global scheduler.
#[must_use]
pub fn default_configs() -> Configs {
    debug!("building default config chain");
    Configs::new()
        .with(trace())
        .with(basic())
        .with(checkpoint(CheckpointScheduler::global()))
}
