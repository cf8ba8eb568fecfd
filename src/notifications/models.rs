use serde::{Deserialize, Serialize};

pub const CHANNEL_TELEGRAM: &str = "telegram";
pub const CHANNEL_EMAIL: &str = "email";

/// The secret half of a channel config. Serialized to JSON and encrypted
/// before being stored in `channel_configs.payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelPayload {
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    Email {
        smtp_host: String,
        smtp_port: u16,
        smtp_username: Option<String>,
        smtp_password: Option<String>,
        from_address: String,
        to_address: String,
    },
}
