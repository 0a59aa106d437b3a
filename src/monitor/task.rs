//! The per-watch background task.
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::WatchContext;
use crate::checker::ProbeStatus;
use crate::db::WatchKey;
use crate::server::config::NotifyPolicy;

/// Why a watch task was told to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The owner removed the watch or cleared all watches.
    Removed,
    /// The watch is being replaced by a task with new settings.
    Restarted,
    /// The process is shutting down, or the registry was dropped.
    Shutdown,
}

/// Spawns the task for `key`. The returned sender is the task's only
/// cancellation handle; sending on it or dropping it stops the task.
pub(crate) fn spawn_watch_task(
    ctx: Arc<WatchContext>,
    key: WatchKey,
    interval_seconds: u64,
) -> (JoinHandle<()>, oneshot::Sender<StopReason>) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        info!(owner = %key.owner, uid = %key.uid, interval_seconds, "Started watch task.");
        run_watch(ctx, key, interval_seconds, shutdown_rx).await;
    });
    (handle, shutdown_tx)
}

async fn run_watch(
    ctx: Arc<WatchContext>,
    key: WatchKey,
    interval_seconds: u64,
    mut shutdown_rx: oneshot::Receiver<StopReason>,
) {
    let mut previous = match ctx
        .store
        .read(|ds| ds.entry(&key).and_then(|e| e.last_status))
        .await
    {
        Ok(status) => status,
        Err(e) => {
            warn!(owner = %key.owner, uid = %key.uid, error = %e, "Failed to read last status, treating it as unknown.");
            None
        }
    };

    // The first tick completes immediately, which gives the initial check.
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut first_check = true;

    let reason = loop {
        tokio::select! {
            biased;
            received = &mut shutdown_rx => {
                break received.unwrap_or(StopReason::Shutdown);
            }
            _ = interval.tick() => {
                let status = ctx.probe.check(&key.uid).await;

                // Cancelled while the probe was in flight: drop the result.
                match shutdown_rx.try_recv() {
                    Err(TryRecvError::Empty) => {}
                    Ok(reason) => {
                        debug!(owner = %key.owner, uid = %key.uid, "Discarding probe result after cancellation.");
                        break reason;
                    }
                    Err(TryRecvError::Closed) => break StopReason::Shutdown,
                }

                record_status(&ctx, &key, status).await;

                if let Some(text) = notice_for(ctx.notify_policy, first_check, previous, status, &key.uid) {
                    notify(&ctx, &key, &text).await;
                    first_check = false;
                }
                // A silent error is not an observation; the next real result
                // still counts as the initial check.
                if let Some(is_live) = status.as_last_status() {
                    previous = Some(is_live);
                    first_check = false;
                }
            }
        }
    };

    info!(owner = %key.owner, uid = %key.uid, reason = ?reason, "Watch task stopped.");
    if let Some(text) = stopped_notice(reason, &key.uid) {
        notify(&ctx, &key, &text).await;
    }
}

/// Persists a completed probe. Errors are never written, and an entry that
/// was removed meanwhile is not recreated.
async fn record_status(ctx: &WatchContext, key: &WatchKey, status: ProbeStatus) {
    let Some(is_live) = status.as_last_status() else {
        warn!(owner = %key.owner, uid = %key.uid, "Probe failed, keeping previous status.");
        return;
    };
    let now = Utc::now().timestamp();

    let updated = ctx
        .store
        .mutate(|ds| match ds.entry_mut(key) {
            Some(entry) => {
                entry.last_status = Some(is_live);
                if entry.added_at_unix == 0 {
                    entry.added_at_unix = now;
                }
                true
            }
            None => false,
        })
        .await;

    match updated {
        Ok(true) => {}
        Ok(false) => {
            debug!(owner = %key.owner, uid = %key.uid, "Watch entry no longer stored, status not recorded.");
        }
        Err(e) => {
            error!(owner = %key.owner, uid = %key.uid, error = %e, "Failed to persist probe status.");
        }
    }
}

async fn notify(ctx: &WatchContext, key: &WatchKey, text: &str) {
    if let Err(e) = ctx.notifier.send(&key.owner, text).await {
        warn!(owner = %key.owner, uid = %key.uid, error = %e, "Failed to deliver notification.");
    }
}

/// Decides whether a probe result is reported and how it is worded.
pub(crate) fn notice_for(
    policy: NotifyPolicy,
    first_check: bool,
    previous: Option<bool>,
    status: ProbeStatus,
    uid: &str,
) -> Option<String> {
    let changed = match status.as_last_status() {
        Some(now) => previous != Some(now),
        None => false,
    };
    let report = match policy {
        NotifyPolicy::EveryCheck => true,
        NotifyPolicy::OnChange => changed,
    };
    if !report {
        return None;
    }

    let heading = if first_check {
        "Initial check"
    } else if changed {
        "Status change"
    } else {
        "Check"
    };
    Some(format!("{heading} for UID {uid}: {}", status.label()))
}

pub(crate) fn stopped_notice(reason: StopReason, uid: &str) -> Option<String> {
    match reason {
        StopReason::Removed => Some(format!("Stopped watching UID {uid}.")),
        StopReason::Restarted => Some(format!(
            "Stopped watching UID {uid}, restarting with new settings."
        )),
        StopReason::Shutdown => None,
    }
}
