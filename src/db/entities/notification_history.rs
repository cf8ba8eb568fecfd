use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only audit row per successful send. Also the durable half of the
/// suppression state: max(notified_at) per (domain, channel, kind) survives
/// process restarts where the in-memory cache does not.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub domain_id: i32,
    pub channel_id: i32,
    /// "down", "up" or "status".
    pub kind: String,
    pub status_code: Option<i32>,
    pub error_description: Option<String>,
    pub notified_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::domain::Entity",
        from = "Column::DomainId",
        to = "super::domain::Column::Id",
        on_delete = "Cascade"
    )]
    Domain,

    #[sea_orm(
        belongs_to = "super::channel_config::Entity",
        from = "Column::ChannelId",
        to = "super::channel_config::Column::Id",
        on_delete = "Cascade"
    )]
    ChannelConfig,
}

impl Related<super::domain::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Domain.def()
    }
}

impl Related<super::channel_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChannelConfig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
