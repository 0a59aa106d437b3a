//! Liveness probes for watched UIDs.
use async_trait::async_trait;

pub mod graph;

pub use graph::GraphProbe;

/// Outcome of a single liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Live,
    Dead,
    /// The check itself failed (network error, timeout). Says nothing about the UID.
    Error,
}

impl ProbeStatus {
    /// The persisted form: `Some(true)` live, `Some(false)` dead, `None` for errors.
    pub fn as_last_status(self) -> Option<bool> {
        match self {
            ProbeStatus::Live => Some(true),
            ProbeStatus::Dead => Some(false),
            ProbeStatus::Error => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProbeStatus::Live => "LIVE",
            ProbeStatus::Dead => "DEAD",
            ProbeStatus::Error => "ERROR",
        }
    }
}

/// Checks whether a UID is live. Implementations enforce their own timeout
/// and report failures as [`ProbeStatus::Error`] instead of erroring out.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn check(&self, uid: &str) -> ProbeStatus;
}
