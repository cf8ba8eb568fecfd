use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::Region;

/// A user's notification endpoint. Routing fields (flags, region filter)
/// are plain columns so the dispatcher can reason about them; the secret
/// half (bot token, SMTP credentials) lives in `payload` as an encrypted
/// JSON blob, same scheme as the channel configs in NodeNexus.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channel_configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    /// "telegram" or "email".
    pub channel_type: String,
    /// Encrypted `notifications::models::ChannelPayload` JSON.
    pub payload: Vec<u8>,
    pub is_active: bool,
    pub notify_on_down: bool,
    pub notify_on_up: bool,
    /// Region codes this channel is limited to; empty array = all regions.
    #[sea_orm(column_type = "JsonBinary")]
    pub regions: Json,
    /// Preferred message language tag. Stored for the senders' templates,
    /// never interpreted by the core.
    pub language: String,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    /// Region filter check: a non-empty filter only admits member regions.
    pub fn accepts_region(&self, region: Region) -> bool {
        let codes: Vec<String> = match serde_json::from_value(self.regions.clone()) {
            Ok(codes) => codes,
            // A malformed filter degrades to "no filtering".
            Err(_) => return true,
        };
        codes.is_empty() || codes.iter().any(|c| Region::parse_lossy(c) == region)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,

    #[sea_orm(has_many = "super::notification_history::Entity")]
    NotificationHistory,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::notification_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NotificationHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn channel(regions: serde_json::Value) -> Model {
        Model {
            id: 1,
            user_id: 1,
            name: "ops".to_string(),
            channel_type: "telegram".to_string(),
            payload: Vec::new(),
            is_active: true,
            notify_on_down: true,
            notify_on_up: true,
            regions,
            language: "en".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_filter_admits_every_region() {
        let ch = channel(serde_json::json!([]));
        assert!(ch.accepts_region(Region::Us));
        assert!(ch.accepts_region(Region::Th));
    }

    #[test]
    fn non_empty_filter_excludes_other_regions() {
        let ch = channel(serde_json::json!(["SG", "TH"]));
        assert!(ch.accepts_region(Region::Th));
        assert!(!ch.accepts_region(Region::Us));
    }

    #[test]
    fn malformed_filter_degrades_to_no_filtering() {
        let ch = channel(serde_json::json!({"not": "a list"}));
        assert!(ch.accepts_region(Region::Br));
    }
}
