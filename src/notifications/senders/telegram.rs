use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{Notifier, SenderError};

/// A sender for pushing messages via the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
    api_url: String,
    bot_token: String,
}

impl TelegramSender {
    pub fn new(
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
    ) -> Result<Self, SenderError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.bot_token)
    }
}

/// Escapes text for Telegram MarkdownV2.
/// Characters to escape: _ * [ ] ( ) ~ ` > # + - = | { } . !
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped_text = String::with_capacity(text.len());
    for char_to_escape in text.chars() {
        match char_to_escape {
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
            | '{' | '}' | '.' | '!' | '\\' => {
                escaped_text.push('\\');
                escaped_text.push(char_to_escape);
            }
            _ => {
                escaped_text.push(char_to_escape);
            }
        }
    }
    escaped_text
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[async_trait]
impl Notifier for TelegramSender {
    async fn send(&self, owner: &str, text: &str) -> Result<(), SenderError> {
        let escaped_message = escape_markdown_v2(text);
        let payload = TelegramMessage {
            chat_id: owner,
            text: &escaped_message,
            parse_mode: "MarkdownV2",
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Telegram API returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown_v2() {
        assert_eq!(
            escape_markdown_v2("UID 42: LIVE (1.5m) - ok!"),
            "UID 42: LIVE \\(1\\.5m\\) \\- ok\\!"
        );
        assert_eq!(escape_markdown_v2("plain text"), "plain text");
    }

    #[test]
    fn test_method_url() {
        let sender = TelegramSender::new("https://api.telegram.org/", "123:abc").unwrap();
        assert_eq!(
            sender.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
