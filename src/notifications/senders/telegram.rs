use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationSender, SenderError};
use crate::notifications::models::ChannelPayload;

/// Sends alerts through the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

/// Escapes text for MarkdownV2. Telegram rejects the whole message if any
/// reserved character is left bare.
fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*'
                | '['
                | ']'
                | '('
                | ')'
                | '~'
                | '`'
                | '>'
                | '#'
                | '+'
                | '-'
                | '='
                | '|'
                | '{'
                | '}'
                | '.'
                | '!'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(
        &self,
        payload: &ChannelPayload,
        _subject: &str,
        body: &str,
    ) -> Result<(), SenderError> {
        let (bot_token, chat_id) = match payload {
            ChannelPayload::Telegram { bot_token, chat_id } => (bot_token, chat_id),
            _ => {
                return Err(SenderError::InvalidPayload(
                    "expected a telegram payload".to_string(),
                ))
            }
        };

        let api_url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
        let text = escape_markdown_v2(body);
        let request = SendMessageRequest {
            chat_id,
            text: &text,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&api_url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "telegram api returned {status}: {error_body}"
            )));
        }
        Ok(())
    }
}
