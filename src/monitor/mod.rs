//! Watch lifecycle: the registry of running watch tasks and the task loop itself.
use std::sync::Arc;

use crate::checker::StatusProbe;
use crate::db::FileStore;
use crate::notifications::Notifier;
use crate::server::config::NotifyPolicy;

pub mod registry;
pub mod restore;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::WatchRegistry;
pub use task::StopReason;

/// Everything a watch task needs, shared by all tasks of a registry.
pub struct WatchContext {
    pub store: Arc<FileStore>,
    pub probe: Arc<dyn StatusProbe>,
    pub notifier: Arc<dyn Notifier>,
    pub notify_policy: NotifyPolicy,
    pub min_interval_seconds: u64,
}

impl WatchContext {
    /// Raises `interval_seconds` to the configured minimum.
    pub fn clamp_interval(&self, interval_seconds: u64) -> u64 {
        interval_seconds.max(self.min_interval_seconds)
    }
}
