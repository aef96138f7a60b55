use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for walkeeper operations.
///
/// Variants follow SQLite's result codes where one exists, so callers that
/// bridge to a C API can map them back with [`WalKeeperError::error_code`].
#[derive(Error, Debug)]
pub enum WalKeeperError {
    // === Database Errors ===
    /// Database file not found.
    #[error("database not found: '{path}'")]
    DatabaseNotFound { path: PathBuf },

    /// Database file is locked by another process.
    #[error("database is locked: '{path}'")]
    DatabaseLocked { path: PathBuf },

    /// Database is busy.
    #[error("database is busy")]
    Busy,

    // === I/O Errors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === WAL Errors ===
    /// WAL checkpoint failed.
    #[error("WAL checkpoint failed for '{path}': {detail}")]
    CheckpointFailed { path: PathBuf, detail: String },

    /// A read-only handle was opened on a database in WAL journal mode.
    ///
    /// SQLite cannot open WAL databases strictly read-only; this is a
    /// configuration mistake, not a transient condition.
    #[error("it is not possible to open read-only WAL databases: '{path}'")]
    ReadOnlyWal { path: PathBuf },

    // === Configuration Errors ===
    /// A pragma statement was rejected by the handle.
    #[error("{statement} failed: {detail}")]
    PragmaFailed { statement: String, detail: String },

    /// Installing the cipher key failed.
    #[error("cipher key rejected: {detail}")]
    CipherFailed { detail: String },

    /// A named step of the handle configuration chain failed.
    #[error("config '{name}' failed: {source}")]
    ConfigFailed {
        name: String,
        #[source]
        source: Box<WalKeeperError>,
    },

    // === Background Worker Errors ===
    /// The maintenance thread could not be started.
    #[error("failed to spawn maintenance thread '{name}': {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The maintenance thread panicked and could not be joined cleanly.
    #[error("maintenance thread '{name}' panicked")]
    WorkerPanicked { name: String },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// SQLite result/error codes for compatibility with C callers.
///
/// These match the numeric values from C SQLite's `sqlite3.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Internal logic error.
    Internal = 2,
    /// Database file is locked.
    Busy = 5,
    /// Attempt to write a read-only database.
    ReadOnly = 8,
    /// Disk I/O error.
    IoErr = 10,
    /// Unable to open database file.
    CantOpen = 14,
    /// Library used incorrectly.
    Misuse = 21,
    /// Authorization denied.
    Auth = 23,
}

impl WalKeeperError {
    /// Map this error to a SQLite error code for compatibility.
    #[allow(clippy::match_same_arms)]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DatabaseNotFound { .. } => ErrorCode::CantOpen,
            Self::DatabaseLocked { .. } | Self::Busy => ErrorCode::Busy,
            Self::Io(_) | Self::CheckpointFailed { .. } => ErrorCode::IoErr,
            Self::ReadOnlyWal { .. } => ErrorCode::Misuse,
            Self::PragmaFailed { .. } => ErrorCode::Error,
            Self::CipherFailed { .. } => ErrorCode::Auth,
            Self::ConfigFailed { source, .. } => source.error_code(),
            Self::WorkerSpawn { .. } | Self::WorkerPanicked { .. } | Self::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Whether this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Busy | Self::DatabaseLocked { .. } => true,
            Self::ConfigFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Whether this error signals misuse that must fail loudly.
    ///
    /// Fatal misuse is never downgraded to a logged warning: the handle-open
    /// sequence that hit it must fail.
    pub fn is_fatal_misuse(&self) -> bool {
        match self {
            Self::ReadOnlyWal { .. } => true,
            Self::ConfigFailed { source, .. } => source.is_fatal_misuse(),
            _ => false,
        }
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::DatabaseNotFound { .. } => Some("Check the file path or create a new database"),
            Self::DatabaseLocked { .. } => {
                Some("Close other connections or wait for the lock to be released")
            }
            Self::Busy => Some("Retry the operation after a short delay"),
            Self::ReadOnlyWal { .. } => {
                Some("Open the database read-write, or switch it out of WAL mode first")
            }
            _ => None,
        }
    }

    /// Get the process exit code for this error (for CLI use).
    pub fn exit_code(&self) -> i32 {
        self.error_code() as i32
    }

    /// Create a checkpoint failure for `path`.
    pub fn checkpoint_failed(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::CheckpointFailed {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create a pragma failure for the rendered `statement`.
    pub fn pragma_failed(statement: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::PragmaFailed {
            statement: statement.into(),
            detail: detail.into(),
        }
    }

    /// Wrap `source` as the failure of config step `name`.
    pub fn config_failed(name: impl Into<String>, source: Self) -> Self {
        Self::ConfigFailed {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `WalKeeperError`.
pub type Result<T> = std::result::Result<T, WalKeeperError>;
