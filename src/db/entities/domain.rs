use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A monitored target. Status fields are written by the reconciler; the
/// settings fields belong to the owner. Inactive domains are never polled
/// or alerted on.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "domains")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub url: String,
    /// Logical region code, see `db::enums::Region`.
    pub region: String,
    /// Poll cadence in minutes, one of 10/20/30/60/120.
    pub interval_minutes: i32,
    pub is_active: bool,
    pub last_status_code: Option<i32>,
    pub last_error_code: Option<i32>,
    pub last_error_description: Option<String>,
    pub last_total_time_ms: Option<i32>,
    pub last_checked_at: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    /// A domain counts as available only once a check has been recorded and
    /// its last status was a non-error HTTP status.
    pub fn is_available(&self) -> bool {
        match (self.last_checked_at, self.last_status_code) {
            (Some(_), Some(code)) => (200..400).contains(&code),
            _ => false,
        }
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

    #[sea_orm(has_many = "super::monitor_registration::Entity")]
    MonitorRegistrations,

    #[sea_orm(has_many = "super::notification_history::Entity")]
    NotificationHistory,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::monitor_registration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonitorRegistrations.def()
    }
}

impl Related<super::notification_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NotificationHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
