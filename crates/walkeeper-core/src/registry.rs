//! Lookup of already-open databases by path.
//!
//! The maintenance worker must never create a database as a side effect of
//! checkpointing, so resolution is "open existing only": a path with no live
//! handle resolves to `Ok(None)`, which callers treat as nothing to do.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::trace;
use walkeeper_error::Result;

use crate::handle::Handle;

/// Resolves a scheduling key to an existing database handle.
pub trait DatabaseResolver: Send + Sync {
    /// Return a handle for `path` only if one is already open.
    ///
    /// `Ok(None)` is the distinguishable "no such database" answer and is not
    /// an error.
    fn open_existing(&self, path: &Path) -> Result<Option<Arc<dyn Handle>>>;
}

/// In-process registry of open handles, keyed by database path.
///
/// Holds weak references: registering a handle does not keep it alive, and a
/// handle dropped by its owner stops resolving.
#[derive(Default)]
pub struct DatabaseRegistry {
    handles: Mutex<HashMap<PathBuf, Weak<dyn Handle>>>,
}

impl DatabaseRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by the global scheduler.
    pub fn global() -> &'static Arc<Self> {
        static GLOBAL_REGISTRY: OnceLock<Arc<DatabaseRegistry>> = OnceLock::new();
        GLOBAL_REGISTRY.get_or_init(|| Arc::new(Self::new()))
    }

    /// Record `handle` as the live handle for its path.
    pub fn register(&self, handle: &Arc<dyn Handle>) {
        let path = handle.path().to_path_buf();
        trace!(path = %path.display(), "database registered");
        self.handles.lock().insert(path, Arc::downgrade(handle));
    }

    /// Forget the handle for `path`. Returns whether one was registered.
    pub fn unregister(&self, path: &Path) -> bool {
        self.handles.lock().remove(path).is_some()
    }

    /// Number of paths with a handle that is still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.handles
            .lock()
            .values()
            .filter(|handle| handle.strong_count() > 0)
            .count()
    }
}

impl DatabaseResolver for DatabaseRegistry {
    fn open_existing(&self, path: &Path) -> Result<Option<Arc<dyn Handle>>> {
        let mut handles = self.handles.lock();
        let Some(weak) = handles.get(path) else {
            return Ok(None);
        };
        if let Some(handle) = weak.upgrade() {
            return Ok(Some(handle));
        }
        handles.remove(path);
        trace!(path = %path.display(), "pruned dropped database handle");
        Ok(None)
    }
}

impl std::fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("paths", &self.handles.lock().len())
            .finish()
    }
}
