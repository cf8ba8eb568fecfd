//! Postgres implementation of [`ChannelStore`].

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

use crate::db::entities::{channel_config, prelude::*};
use crate::db::store::{ChannelStore, StoreError};

pub struct PgChannelStore {
    db: DatabaseConnection,
}

impl PgChannelStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChannelStore for PgChannelStore {
    async fn channels_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<ChannelConfigModel>, StoreError> {
        Ok(ChannelConfig::find()
            .filter(channel_config::Column::UserId.eq(user_id))
            .order_by_asc(channel_config::Column::Name)
            .all(&self.db)
            .await?)
    }
}
