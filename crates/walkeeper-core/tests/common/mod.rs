#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use walkeeper_core::{
    CommittedHook, DatabaseRegistry, Handle, PerformanceTrace, Pragma, PragmaStatement, SqlTrace,
};
use walkeeper_error::{Result, WalKeeperError};

/// Checkpoints observed across every handle sharing the log, in execution
/// order.
pub type CheckpointLog = Arc<Mutex<Vec<(PathBuf, Instant)>>>;

/// In-memory stand-in for an engine connection.
pub struct FakeHandle {
    path: PathBuf,
    readonly: bool,
    pragmas: Mutex<HashMap<Pragma, String>>,
    executed: Mutex<Vec<String>>,
    hook: Mutex<Option<CommittedHook>>,
    cipher_key: Mutex<Option<Vec<u8>>>,
    sql_trace: Mutex<Option<SqlTrace>>,
    performance_trace: Mutex<Option<PerformanceTrace>>,
    fail_checkpoint: AtomicBool,
    checkpoints: CheckpointLog,
}

impl FakeHandle {
    pub fn new(path: &str, checkpoints: &CheckpointLog) -> Arc<Self> {
        Self::build(path, false, checkpoints)
    }

    pub fn readonly(path: &str, checkpoints: &CheckpointLog) -> Arc<Self> {
        Self::build(path, true, checkpoints)
    }

    fn build(path: &str, readonly: bool, checkpoints: &CheckpointLog) -> Arc<Self> {
        let mut pragmas = HashMap::new();
        pragmas.insert(Pragma::JournalMode, "delete".to_owned());
        pragmas.insert(Pragma::LockingMode, "normal".to_owned());
        Arc::new(Self {
            path: PathBuf::from(path),
            readonly,
            pragmas: Mutex::new(pragmas),
            executed: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
            cipher_key: Mutex::new(None),
            sql_trace: Mutex::new(None),
            performance_trace: Mutex::new(None),
            fail_checkpoint: AtomicBool::new(false),
            checkpoints: Arc::clone(checkpoints),
        })
    }

    pub fn set_pragma(&self, pragma: Pragma, value: &str) {
        self.pragmas.lock().insert(pragma, value.to_owned());
    }

    pub fn pragma(&self, pragma: Pragma) -> Option<String> {
        self.pragmas.lock().get(&pragma).cloned()
    }

    pub fn fail_checkpoints(&self, fail: bool) {
        self.fail_checkpoint.store(fail, Ordering::SeqCst);
    }

    /// Simulate a successful commit that changed `pages` pages.
    pub fn commit(&self, pages: u32) {
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(&self.path, pages);
        }
    }

    pub fn has_hook(&self) -> bool {
        self.hook.lock().is_some()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    pub fn cipher_key(&self) -> Option<Vec<u8>> {
        self.cipher_key.lock().clone()
    }

    pub fn sql_trace(&self) -> Option<SqlTrace> {
        self.sql_trace.lock().clone()
    }

    pub fn performance_trace(&self) -> Option<PerformanceTrace> {
        self.performance_trace.lock().clone()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints
            .lock()
            .iter()
            .filter(|(path, _)| *path == self.path)
            .count()
    }

    pub fn checkpoint_times(&self) -> Vec<Instant> {
        self.checkpoints
            .lock()
            .iter()
            .filter(|(path, _)| *path == self.path)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Register in `registry` as the live handle for this path.
    pub fn register_in(self: &Arc<Self>, registry: &DatabaseRegistry) {
        let concrete: Arc<Self> = Arc::clone(self);
        let handle: Arc<dyn Handle> = concrete;
        registry.register(&handle);
    }
}

impl Handle for FakeHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn query_pragma(&self, pragma: Pragma) -> Result<String> {
        Ok(self.pragmas.lock().get(&pragma).cloned().unwrap_or_default())
    }

    fn exec(&self, statement: &PragmaStatement) -> Result<()> {
        if statement.pragma == Pragma::WalCheckpoint {
            self.checkpoints
                .lock()
                .push((self.path.clone(), Instant::now()));
            if self.fail_checkpoint.load(Ordering::SeqCst) {
                return Err(WalKeeperError::checkpoint_failed(
                    self.path.clone(),
                    "simulated disk I/O error",
                ));
            }
            return Ok(());
        }
        if self.readonly {
            return Err(WalKeeperError::pragma_failed(
                statement.to_string(),
                "attempt to write a readonly database",
            ));
        }
        if let Some(value) = &statement.value {
            self.pragmas.lock().insert(statement.pragma, value.clone());
        }
        self.executed.lock().push(statement.to_string());
        Ok(())
    }

    fn register_committed_hook(&self, hook: CommittedHook) {
        *self.hook.lock() = Some(hook);
    }

    fn set_cipher_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(WalKeeperError::CipherFailed {
                detail: "empty key".to_owned(),
            });
        }
        *self.cipher_key.lock() = Some(key.to_vec());
        Ok(())
    }

    fn set_sql_trace(&self, trace: SqlTrace) {
        *self.sql_trace.lock() = Some(trace);
    }

    fn set_performance_trace(&self, trace: PerformanceTrace) {
        *self.performance_trace.lock() = Some(trace);
    }
}

pub fn new_log() -> CheckpointLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}
