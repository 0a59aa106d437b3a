//! In-process fakes shared by the watch tests.
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use super::{WatchContext, WatchRegistry};
use crate::checker::{ProbeStatus, StatusProbe};
use crate::db::{FileStore, WatchEntry, WatchKey};
use crate::notifications::{Notifier, SenderError};
use crate::server::config::NotifyPolicy;

pub(crate) const TEST_MIN_INTERVAL: u64 = 10;

/// Returns the scripted statuses in order, then repeats the last one.
pub(crate) struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeStatus>>,
    last: Mutex<ProbeStatus>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProbe {
    pub(crate) fn new(script: Vec<ProbeStatus>) -> Self {
        Self::with_delay(script, Duration::ZERO)
    }

    /// Every check takes `delay` before answering.
    pub(crate) fn with_delay(script: Vec<ProbeStatus>, delay: Duration) -> Self {
        let last = script.last().copied().unwrap_or(ProbeStatus::Error);
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(last),
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of checks that were running at the same time.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for ScriptedProbe {
    async fn check(&self, _uid: &str) -> ProbeStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(status) => {
                *self.last.lock().unwrap() = status;
                status
            }
            None => *self.last.lock().unwrap(),
        }
    }
}

/// Forwards every notification into a channel.
pub(crate) struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(String, String)>,
}

impl ChannelNotifier {
    pub(crate) fn new(tx: mpsc::UnboundedSender<(String, String)>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, owner: &str, text: &str) -> Result<(), SenderError> {
        let _ = self.tx.send((owner.to_string(), text.to_string()));
        Ok(())
    }
}

pub(crate) struct Harness {
    pub ctx: Arc<WatchContext>,
    pub probe: Arc<ScriptedProbe>,
    pub notices: mpsc::UnboundedReceiver<(String, String)>,
    _dir: TempDir,
}

impl Harness {
    pub(crate) fn new(policy: NotifyPolicy, script: Vec<ProbeStatus>) -> Self {
        Self::with_probe(policy, ScriptedProbe::new(script))
    }

    pub(crate) fn with_probe(policy: NotifyPolicy, probe: ScriptedProbe) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("data.json"), TEST_MIN_INTERVAL));
        let probe = Arc::new(probe);
        let (tx, notices) = mpsc::unbounded_channel();

        let ctx = Arc::new(WatchContext {
            store,
            probe: probe.clone(),
            notifier: Arc::new(ChannelNotifier::new(tx)),
            notify_policy: policy,
            min_interval_seconds: TEST_MIN_INTERVAL,
        });
        Self {
            ctx,
            probe,
            notices,
            _dir: dir,
        }
    }

    pub(crate) async fn seed_entry(&self, owner: &str, entry: WatchEntry) {
        self.ctx
            .store
            .mutate(|ds| {
                ds.owner_or_insert(owner, 60)
                    .items
                    .insert(entry.uid.clone(), entry);
            })
            .await
            .unwrap();
    }

    pub(crate) async fn stored_entry(&self, owner: &str, uid: &str) -> Option<WatchEntry> {
        self.ctx
            .store
            .read(|ds| ds.entry(&WatchKey::new(owner, uid)).cloned())
            .await
            .unwrap()
    }

    /// A registry sharing this harness's store, probe and notifier.
    pub(crate) fn registry(&self) -> WatchRegistry {
        WatchRegistry::new(WatchContext {
            store: self.ctx.store.clone(),
            probe: self.ctx.probe.clone(),
            notifier: self.ctx.notifier.clone(),
            notify_policy: self.ctx.notify_policy,
            min_interval_seconds: self.ctx.min_interval_seconds,
        })
    }

    /// Everything notified so far, texts only.
    pub(crate) fn drain_texts(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok((_, text)) = self.notices.try_recv() {
            texts.push(text);
        }
        texts
    }
}

pub(crate) async fn recv_notice(rx: &mut mpsc::UnboundedReceiver<(String, String)>) -> (String, String) {
    tokio::time::timeout(Duration::from_secs(3600), rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("notification channel closed")
}
