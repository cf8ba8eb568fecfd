use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{NotificationSender, SenderError};
use crate::notifications::models::ChannelPayload;

/// Sends alerts over SMTP. The transport is built per send because every
/// channel config carries its own relay; alert volume is far too low for
/// connection pooling to matter.
pub struct EmailSender;

impl Default for EmailSender {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send(
        &self,
        payload: &ChannelPayload,
        subject: &str,
        body: &str,
    ) -> Result<(), SenderError> {
        let (host, port, username, password, from_address, to_address) = match payload {
            ChannelPayload::Email {
                smtp_host,
                smtp_port,
                smtp_username,
                smtp_password,
                from_address,
                to_address,
            } => (
                smtp_host,
                *smtp_port,
                smtp_username,
                smtp_password,
                from_address,
                to_address,
            ),
            _ => {
                return Err(SenderError::InvalidPayload(
                    "expected an email payload".to_string(),
                ))
            }
        };

        let from: Mailbox = from_address
            .parse()
            .map_err(|_| SenderError::InvalidPayload(format!("bad from address: {from_address}")))?;
        let to: Mailbox = to_address
            .parse()
            .map_err(|_| SenderError::InvalidPayload(format!("bad to address: {to_address}")))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| SenderError::SendFailed(e.to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| SenderError::Smtp(e.to_string()))?
            .port(port);
        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        builder
            .build()
            .send(email)
            .await
            .map_err(|e| SenderError::Smtp(e.to_string()))?;
        Ok(())
    }
}
