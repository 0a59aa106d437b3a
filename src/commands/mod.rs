//! Operations behind the user-facing commands: every change to the watch set
//! goes through here so the store and the registry stay in step.
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

use crate::db::{FileStore, StoreError, WatchEntry};
use crate::monitor::WatchRegistry;
use crate::server::config::EmptyOwnerPolicy;

pub mod interval;

pub use interval::{IntervalError, parse_interval};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("UID must be numeric, got '{0}'")]
    InvalidUid(String),
    #[error(transparent)]
    InvalidInterval(#[from] IntervalError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Status counts for one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchStats {
    pub total: usize,
    pub live: usize,
    pub dead: usize,
    pub unknown: usize,
}

/// Owner-level operations over the store and the registry.
///
/// Each changing operation holds its owner's lock from the store update
/// through the registry update, so concurrent commands from one chat apply
/// in some serial order and never leave a task without a stored entry.
pub struct WatchService {
    store: Arc<FileStore>,
    registry: Arc<WatchRegistry>,
    min_interval_seconds: u64,
    default_interval_seconds: u64,
    empty_owner_policy: EmptyOwnerPolicy,
    owner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Accepts decimal UIDs that fit in 64 bits.
pub fn validate_uid(uid: &str) -> Result<(), WatchError> {
    if uid.is_empty() || !uid.bytes().all(|b| b.is_ascii_digit()) || uid.parse::<u64>().is_err() {
        return Err(WatchError::InvalidUid(uid.to_string()));
    }
    Ok(())
}

impl WatchService {
    pub fn new(
        store: Arc<FileStore>,
        registry: Arc<WatchRegistry>,
        min_interval_seconds: u64,
        default_interval_seconds: u64,
        empty_owner_policy: EmptyOwnerPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            min_interval_seconds,
            default_interval_seconds: default_interval_seconds.max(min_interval_seconds),
            empty_owner_policy,
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_owner(&self, owner: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .owner_locks
            .lock()
            .await
            .entry(owner.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.registry
    }

    /// Registers (or reconfigures) a watch and (re)starts its task.
    ///
    /// Without an explicit interval the owner's default applies. An existing
    /// entry keeps its `added_at_unix`, `last_status` and, if `note` is empty,
    /// its note.
    pub async fn add_watch(
        &self,
        owner: &str,
        uid: &str,
        interval_seconds: Option<u64>,
        note: &str,
    ) -> Result<WatchEntry, WatchError> {
        validate_uid(uid)?;
        if interval_seconds == Some(0) {
            return Err(IntervalError::NonPositive.into());
        }

        let now = Utc::now().timestamp();
        let min = self.min_interval_seconds;
        let default_interval = self.default_interval_seconds;
        let note = note.trim();

        let _owner_guard = self.lock_owner(owner).await;
        let entry = self
            .store
            .mutate(|ds| {
                let owner_data = ds.owner_or_insert(owner, default_interval);
                let interval = interval_seconds
                    .unwrap_or(owner_data.default_interval_seconds)
                    .max(min);
                let entry = owner_data
                    .items
                    .entry(uid.to_string())
                    .or_insert_with(|| WatchEntry::new(uid, interval, now));
                entry.uid = uid.to_string();
                entry.interval_seconds = interval;
                if !note.is_empty() {
                    entry.note = note.to_string();
                }
                if entry.added_at_unix == 0 {
                    entry.added_at_unix = now;
                }
                entry.clone()
            })
            .await?;

        self.registry
            .start(owner, uid, entry.interval_seconds)
            .await;
        info!(owner = owner, uid = uid, interval_seconds = entry.interval_seconds, "Watch added.");
        Ok(entry)
    }

    /// Stops and forgets one watch. Returns whether anything was removed.
    pub async fn remove_watch(&self, owner: &str, uid: &str) -> Result<bool, WatchError> {
        let _owner_guard = self.lock_owner(owner).await;
        let stopped = self.registry.stop(owner, uid).await;
        let policy = self.empty_owner_policy;

        let removed = self
            .store
            .mutate(|ds| {
                let Some(owner_data) = ds.owner_mut(owner) else {
                    return false;
                };
                let removed = owner_data.items.remove(uid).is_some();
                if owner_data.items.is_empty() && policy == EmptyOwnerPolicy::Prune {
                    ds.owners.remove(owner);
                }
                removed
            })
            .await
            .inspect_err(|e| {
                error!(owner = owner, uid = uid, error = %e, "Watch stopped but its removal was not persisted; it will come back after a restart.");
            })?;

        info!(owner = owner, uid = uid, stopped, removed, "Watch removed.");
        Ok(stopped || removed)
    }

    /// Stops and forgets all watches of `owner`. Returns how many entries were removed.
    pub async fn clear_owner(&self, owner: &str) -> Result<usize, WatchError> {
        let _owner_guard = self.lock_owner(owner).await;
        let stopped = self.registry.stop_all(owner).await;
        let policy = self.empty_owner_policy;

        let removed = self
            .store
            .mutate(|ds| {
                let count = ds.owner(owner).map(|o| o.items.len()).unwrap_or(0);
                match policy {
                    EmptyOwnerPolicy::Keep => {
                        if let Some(owner_data) = ds.owner_mut(owner) {
                            owner_data.items.clear();
                        }
                    }
                    EmptyOwnerPolicy::Prune => {
                        ds.owners.remove(owner);
                    }
                }
                count
            })
            .await
            .inspect_err(|e| {
                error!(owner = owner, stopped, error = %e, "Watches stopped but clearing was not persisted; they will come back after a restart.");
            })?;

        info!(owner = owner, stopped, removed, "Owner cleared.");
        Ok(removed)
    }

    /// Sets the owner's default interval, applies it to every existing entry
    /// and restarts their tasks. Returns the interval actually applied.
    pub async fn set_default_interval(
        &self,
        owner: &str,
        interval_seconds: u64,
    ) -> Result<u64, WatchError> {
        if interval_seconds == 0 {
            return Err(IntervalError::NonPositive.into());
        }
        let interval = interval_seconds.max(self.min_interval_seconds);

        let _owner_guard = self.lock_owner(owner).await;
        let uids: Vec<String> = self
            .store
            .mutate(|ds| {
                let owner_data = ds.owner_or_insert(owner, interval);
                owner_data.default_interval_seconds = interval;
                for entry in owner_data.items.values_mut() {
                    entry.interval_seconds = interval;
                }
                owner_data.items.keys().cloned().collect()
            })
            .await?;

        for uid in &uids {
            self.registry.start(owner, uid, interval).await;
        }
        info!(owner = owner, interval_seconds = interval, restarted = uids.len(), "Default interval updated.");
        Ok(interval)
    }

    /// The owner's default interval, or the global default for unknown owners.
    pub async fn default_interval(&self, owner: &str) -> Result<u64, WatchError> {
        let fallback = self.default_interval_seconds;
        Ok(self
            .store
            .read(|ds| {
                ds.owner(owner)
                    .map(|o| o.default_interval_seconds)
                    .unwrap_or(fallback)
            })
            .await?)
    }

    /// The owner's watches, oldest first.
    pub async fn list_watches(&self, owner: &str) -> Result<Vec<WatchEntry>, WatchError> {
        Ok(self
            .store
            .read(|ds| ds.owner(owner).map(|o| o.sorted_entries()).unwrap_or_default())
            .await?)
    }

    pub async fn stats(&self, owner: &str) -> Result<WatchStats, WatchError> {
        Ok(self
            .store
            .read(|ds| {
                let mut stats = WatchStats::default();
                let Some(owner_data) = ds.owner(owner) else {
                    return stats;
                };
                for entry in owner_data.items.values() {
                    stats.total += 1;
                    match entry.last_status {
                        Some(true) => stats.live += 1,
                        Some(false) => stats.dead += 1,
                        None => stats.unknown += 1,
                    }
                }
                stats
            })
            .await?)
    }
}
