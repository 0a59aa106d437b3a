use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::WatchContext;
use super::task::{StopReason, spawn_watch_task};
use crate::db::WatchKey;

struct RunningWatch {
    handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<StopReason>,
    interval_seconds: u64,
}

impl RunningWatch {
    /// Signals the task and hands back its handle so the caller can await it.
    fn cancel(self, key: &WatchKey, reason: StopReason) -> JoinHandle<()> {
        if self.shutdown_tx.send(reason).is_err() {
            warn!(owner = %key.owner, uid = %key.uid, "Failed to send shutdown signal to watch task; it might have already finished.");
        }
        self.handle
    }
}

/// Manages the lifecycle of all watch tasks.
///
/// The task table sits behind a single async mutex. A key leaves the table in
/// the same critical section that signals its cancellation and awaits the
/// task, so at most one task per key is ever alive.
pub struct WatchRegistry {
    ctx: Arc<WatchContext>,
    running_tasks: Mutex<HashMap<WatchKey, RunningWatch>>,
}

impl WatchRegistry {
    pub fn new(ctx: WatchContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            running_tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &WatchContext {
        &self.ctx
    }

    /// Starts the watch for (`owner`, `uid`), replacing any running one.
    ///
    /// An existing task is cancelled and awaited before the new one is
    /// spawned, so the two never overlap. Returns the interval actually used,
    /// which is never below the configured minimum.
    pub async fn start(&self, owner: &str, uid: &str, interval_seconds: u64) -> u64 {
        let interval_seconds = self.ctx.clamp_interval(interval_seconds);
        let key = WatchKey::new(owner, uid);

        let mut tasks = self.running_tasks.lock().await;
        if let Some(existing) = tasks.remove(&key) {
            info!(owner = owner, uid = uid, interval_seconds, "Restarting watch task.");
            let handle = existing.cancel(&key, StopReason::Restarted);
            if let Err(e) = handle.await {
                warn!(owner = owner, uid = uid, error = %e, "Previous watch task ended abnormally.");
            }
        } else {
            info!(owner = owner, uid = uid, interval_seconds, "Starting new watch task.");
        }

        let (handle, shutdown_tx) = spawn_watch_task(self.ctx.clone(), key.clone(), interval_seconds);
        tasks.insert(
            key,
            RunningWatch {
                handle,
                shutdown_tx,
                interval_seconds,
            },
        );
        interval_seconds
    }

    /// Stops the watch for (`owner`, `uid`). Returns `false` if none was running.
    ///
    /// The task is awaited with the table locked, so a `start` for the same
    /// key cannot spawn its replacement while the old task is still running.
    pub async fn stop(&self, owner: &str, uid: &str) -> bool {
        let key = WatchKey::new(owner, uid);
        let mut tasks = self.running_tasks.lock().await;
        let Some(existing) = tasks.remove(&key) else {
            return false;
        };

        let handle = existing.cancel(&key, StopReason::Removed);
        if let Err(e) = handle.await {
            warn!(owner = owner, uid = uid, error = %e, "Watch task ended abnormally.");
        }
        info!(owner = owner, uid = uid, "Stopped watch task.");
        true
    }

    /// Stops every watch belonging to `owner`. Returns how many were running.
    pub async fn stop_all(&self, owner: &str) -> usize {
        let mut tasks = self.running_tasks.lock().await;
        let keys: Vec<WatchKey> = tasks.keys().filter(|k| k.owner == owner).cloned().collect();
        let handles: Vec<(WatchKey, JoinHandle<()>)> = keys
            .into_iter()
            .filter_map(|key| {
                let existing = tasks.remove(&key)?;
                let handle = existing.cancel(&key, StopReason::Removed);
                Some((key, handle))
            })
            .collect();

        let count = handles.len();
        for (key, handle) in handles {
            if let Err(e) = handle.await {
                warn!(owner = %key.owner, uid = %key.uid, error = %e, "Watch task ended abnormally.");
            }
        }
        info!(owner = owner, count, "Stopped all watch tasks of owner.");
        count
    }

    /// Stops every task, for process shutdown. No owner is notified.
    pub async fn shutdown(&self) {
        let mut tasks = self.running_tasks.lock().await;
        info!(count = tasks.len(), "Shutting down all watch tasks.");
        let handles: Vec<(WatchKey, JoinHandle<()>)> = tasks
            .drain()
            .map(|(key, running)| {
                let handle = running.cancel(&key, StopReason::Shutdown);
                (key, handle)
            })
            .collect();
        for (key, handle) in handles {
            if let Err(e) = handle.await {
                warn!(owner = %key.owner, uid = %key.uid, error = %e, "Watch task ended abnormally.");
            }
        }
    }

    pub async fn is_active(&self, owner: &str, uid: &str) -> bool {
        self.running_tasks
            .lock()
            .await
            .contains_key(&WatchKey::new(owner, uid))
    }

    pub async fn active_count(&self) -> usize {
        self.running_tasks.lock().await.len()
    }

    /// Keys of the running tasks of `owner`, sorted.
    pub async fn active_keys(&self, owner: &str) -> Vec<WatchKey> {
        let tasks = self.running_tasks.lock().await;
        let mut keys: Vec<WatchKey> = tasks.keys().filter(|k| k.owner == owner).cloned().collect();
        keys.sort();
        keys
    }

    /// Interval the running task for the key was started with.
    pub async fn interval_of(&self, owner: &str, uid: &str) -> Option<u64> {
        self.running_tasks
            .lock()
            .await
            .get(&WatchKey::new(owner, uid))
            .map(|r| r.interval_seconds)
    }
}
