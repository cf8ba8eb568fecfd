use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::RegistrationState;

/// The link between a local domain and one provider's remote monitor
/// object. `external_id` stays null until remote creation succeeds; a
/// non-null value must always correspond to a live remote object.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitor_registrations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub domain_id: i32,
    pub provider: String,
    pub external_id: Option<String>,
    /// Region codes actually submitted to the provider (primary + resolved
    /// fallbacks), as a JSON array.
    #[sea_orm(column_type = "JsonBinary")]
    pub regions: Json,
    /// See `db::enums::RegistrationState`.
    pub state: String,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    pub fn is_live(&self) -> bool {
        self.external_id.is_some()
            && matches!(
                self.state.parse::<RegistrationState>(),
                Ok(RegistrationState::Pending) | Ok(RegistrationState::Active)
            )
    }
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
}

impl Related<super::domain::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Domain.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
