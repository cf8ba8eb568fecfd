use async_trait::async_trait;
use thiserror::Error;

use super::models::ChannelPayload;

pub mod email;
pub mod telegram;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("failed to send notification: {0}")]
    SendFailed(String),
    #[error("invalid payload for sender: {0}")]
    InvalidPayload(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("smtp error: {0}")]
    Smtp(String),
}

/// A channel type's send primitive. Delivery is best-effort: callers log
/// failures and move on, they never retry here.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends one message. `subject` is used by channels that have a subject
    /// concept (email) and ignored by the rest.
    async fn send(
        &self,
        payload: &ChannelPayload,
        subject: &str,
        body: &str,
    ) -> Result<(), SenderError>;
}
