//! Boundary between walkeeper and the storage engine's connection handles.
//!
//! Everything here is implemented by the engine: walkeeper only issues pragma
//! statements, installs hooks, and reads back the handle's identity.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use walkeeper_error::Result;

/// Callback fired synchronously on the committing thread after every
/// successful commit, with the handle path and the number of pages the
/// transaction changed.
pub type CommittedHook = Box<dyn Fn(&Path, u32) + Send + Sync>;

/// Receives every SQL statement a handle executes.
pub type SqlTrace = Arc<dyn Fn(&str) + Send + Sync>;

/// Receives each statement a handle executed together with its wall time.
pub type PerformanceTrace = Arc<dyn Fn(&str, Duration) + Send + Sync>;

/// Pragmas walkeeper reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pragma {
    JournalMode,
    LockingMode,
    Synchronous,
    Fullfsync,
    CipherPageSize,
    WalCheckpoint,
}

impl Pragma {
    /// The pragma name as SQLite spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JournalMode => "journal_mode",
            Self::LockingMode => "locking_mode",
            Self::Synchronous => "synchronous",
            Self::Fullfsync => "fullfsync",
            Self::CipherPageSize => "cipher_page_size",
            Self::WalCheckpoint => "wal_checkpoint",
        }
    }
}

impl fmt::Display for Pragma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `PRAGMA name` query or `PRAGMA name = value` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaStatement {
    pub pragma: Pragma,
    pub value: Option<String>,
}

impl PragmaStatement {
    /// `PRAGMA name`
    #[must_use]
    pub const fn get(pragma: Pragma) -> Self {
        Self {
            pragma,
            value: None,
        }
    }

    /// `PRAGMA name = value`
    #[must_use]
    pub fn set(pragma: Pragma, value: impl fmt::Display) -> Self {
        Self {
            pragma,
            value: Some(value.to_string()),
        }
    }

    /// `PRAGMA name = 1` or `PRAGMA name = 0`
    #[must_use]
    pub fn set_flag(pragma: Pragma, enabled: bool) -> Self {
        Self::set(pragma, u8::from(enabled))
    }
}

impl fmt::Display for PragmaStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "PRAGMA {} = {value}", self.pragma),
            None => write!(f, "PRAGMA {}", self.pragma),
        }
    }
}

/// An open connection to one database file.
///
/// Implementations must be safe to share: the commit hook and the
/// maintenance thread may reach the same handle from different threads.
pub trait Handle: Send + Sync {
    /// Path of the main database file. Used as the scheduling key.
    fn path(&self) -> &Path;

    /// Whether the handle was opened read-only.
    fn is_readonly(&self) -> bool;

    /// Run a `PRAGMA name` query and return the first column of the first
    /// row as text.
    fn query_pragma(&self, pragma: Pragma) -> Result<String>;

    /// Execute a pragma statement, discarding any rows.
    fn exec(&self, statement: &PragmaStatement) -> Result<()>;

    /// Install the single committed hook for this handle, replacing any
    /// previous one.
    fn register_committed_hook(&self, hook: CommittedHook);

    /// Install the encryption key before any page is read.
    fn set_cipher_key(&self, key: &[u8]) -> Result<()>;

    fn set_sql_trace(&self, trace: SqlTrace);

    fn set_performance_trace(&self, trace: PerformanceTrace);
}
