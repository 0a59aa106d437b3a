//! Long-polls the Telegram Bot API for incoming chat messages.
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::CommandDispatcher;
use crate::notifications::Notifier;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Telegram API error: {0}")]
    Api(String),
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Deserialize, Debug)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Chat {
    pub id: i64,
}

impl Update {
    /// The (owner, text) pair of a text message; other updates yield nothing.
    pub fn into_text_message(self) -> Option<(String, String)> {
        let message = self.message?;
        let text = message.text?;
        Some((message.chat.id.to_string(), text))
    }
}

/// Offset that acknowledges every update in `updates`.
fn next_offset(current: i64, updates: &[Update]) -> i64 {
    updates
        .iter()
        .map(|u| u.update_id + 1)
        .fold(current, i64::max)
}

fn parse_updates(body: &[u8]) -> Result<Vec<Update>, PollError> {
    let response: ApiResponse<Vec<Update>> = serde_json::from_slice(body)
        .map_err(|e| PollError::Api(format!("malformed getUpdates response: {e}")))?;
    if !response.ok {
        return Err(PollError::Api(
            response
                .description
                .unwrap_or_else(|| "getUpdates returned ok=false".to_string()),
        ));
    }
    Ok(response.result.unwrap_or_default())
}

pub struct TelegramPoller {
    client: Client,
    api_url: String,
    bot_token: String,
    poll_timeout_seconds: u64,
    dispatcher: Arc<CommandDispatcher>,
    replies: Arc<dyn Notifier>,
}

impl TelegramPoller {
    pub fn new(
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        poll_timeout_seconds: u64,
        dispatcher: Arc<CommandDispatcher>,
        replies: Arc<dyn Notifier>,
    ) -> Result<Self, PollError> {
        // The request must outlive the server-side long-poll window.
        let client = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_seconds + 10))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            poll_timeout_seconds,
            dispatcher,
            replies,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.bot_token)
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, PollError> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout_seconds.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await?;
        let body = response.bytes().await?;
        parse_updates(&body)
    }

    /// Polls until `shutdown_rx` fires. Every text message is handled on its
    /// own task so a slow command never holds up the next poll.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>) {
        info!(poll_timeout_seconds = self.poll_timeout_seconds, "Telegram poller started.");
        let mut offset = 0i64;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                result = self.get_updates(offset) => match result {
                    Ok(updates) => {
                        backoff = INITIAL_BACKOFF;
                        offset = next_offset(offset, &updates);
                        for update in updates {
                            if let Some((owner, text)) = update.into_text_message() {
                                self.spawn_handler(owner, text);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, backoff_seconds = backoff.as_secs(), "Polling Telegram failed, backing off.");
                        tokio::select! {
                            biased;
                            _ = &mut shutdown_rx => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }
        info!("Telegram poller stopped.");
    }

    fn spawn_handler(&self, owner: String, text: String) {
        let dispatcher = self.dispatcher.clone();
        let replies = self.replies.clone();
        tokio::spawn(async move {
            debug!(owner = %owner, "Handling incoming message.");
            let Some(reply) = dispatcher.handle(&owner, &text).await else {
                return;
            };
            if let Err(e) = replies.send(&owner, &reply).await {
                error!(owner = %owner, error = %e, "Failed to send command reply.");
            }
        });
    }
}
