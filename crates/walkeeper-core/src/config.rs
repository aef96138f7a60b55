//! Ordered chain of named configuration steps applied to each new handle.
//!
//! A handle is unusable until every step succeeds; the first failure aborts
//! the chain and is reported as [`WalKeeperError::ConfigFailed`] naming the
//! step.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};
use walkeeper_error::{Result, WalKeeperError};

use crate::handle::Handle;

/// Body of a configuration step.
pub type ConfigFn = Arc<dyn Fn(&dyn Handle) -> Result<()> + Send + Sync>;

/// Well-known positions in the chain. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum ConfigOrder {
    Trace = 0,
    Cipher = 1,
    Basic = 2,
    Checkpoint = 3,
}

impl ConfigOrder {
    #[must_use]
    pub const fn value(self) -> i32 {
        self as i32
    }
}

/// One named configuration step.
#[derive(Clone)]
pub struct Config {
    name: String,
    order: i32,
    apply: ConfigFn,
}

impl Config {
    pub fn new<F>(name: impl Into<String>, order: i32, apply: F) -> Self
    where
        F: Fn(&dyn Handle) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            order,
            apply: Arc::new(apply),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Run this step alone against `handle`.
    pub fn apply(&self, handle: &dyn Handle) -> Result<()> {
        (self.apply)(handle)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// An ordered, name-unique chain of [`Config`] steps.
///
/// Steps run by ascending order; steps sharing an order run in insertion
/// order. Inserting a step whose name is already present replaces it.
#[derive(Debug, Clone, Default)]
pub struct Configs {
    entries: Vec<(i32, u64, Config)>,
    next_seq: u64,
}

impl Configs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Self::insert`].
    #[must_use]
    pub fn with(mut self, config: Config) -> Self {
        self.insert(config);
        self
    }

    /// Add `config`, replacing a step with the same name.
    pub fn insert(&mut self, config: Config) {
        self.entries.retain(|(_, _, existing)| existing.name != config.name);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push((config.order, seq, config));
        self.entries
            .sort_by_key(|&(order, seq, _)| (order, seq));
    }

    /// Remove the step called `name`. Returns whether one was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(_, _, config)| config.name != name);
        self.entries.len() != before
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Config> {
        self.entries
            .iter()
            .map(|(_, _, config)| config)
            .find(|config| config.name == name)
    }

    /// Step names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|(_, _, config)| config.name.as_str())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every step to `handle` in order, stopping at the first failure.
    pub fn apply(&self, handle: &dyn Handle) -> Result<()> {
        for (_, _, config) in &self.entries {
            if let Err(err) = config.apply(handle) {
                if err.is_fatal_misuse() {
                    error!(
                        config = %config.name,
                        path = %handle.path().display(),
                        error = %err,
                        "fatal misuse while configuring handle"
                    );
                }
                return Err(WalKeeperError::config_failed(config.name.clone(), err));
            }
            debug!(config = %config.name, path = %handle.path().display(), "config applied");
        }
        Ok(())
    }
}
