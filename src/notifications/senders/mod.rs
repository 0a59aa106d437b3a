use async_trait::async_trait;
use thiserror::Error;

pub mod telegram;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Delivers a human-readable message to an owner.
///
/// Delivery is best effort: callers log a failed send and move on, a failure
/// never feeds back into watch state.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `text` to `owner`.
    ///
    /// # Arguments
    ///
    /// * `owner` - The owner id, for Telegram the chat id.
    /// * `text` - Plain text; senders apply whatever escaping their channel needs.
    async fn send(&self, owner: &str, text: &str) -> Result<(), SenderError>;
}
