//! Postgres implementation of [`HistoryStore`].
//!
//! This path intentionally uses the raw sqlx pool rather than the sea-orm
//! entities: the append is hot relative to everything else and the only
//! read is a single MAX() scalar.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::enums::NotificationKind;
use crate::db::store::{HistoryRecord, HistoryStore, StoreError};

pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notification_history \
             (domain_id, channel_id, kind, status_code, error_description, notified_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.domain_id)
        .bind(record.channel_id)
        .bind(record.kind.as_str())
        .bind(record.status_code)
        .bind(record.error_description)
        .bind(record.notified_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_notified_at(
        &self,
        domain_id: i32,
        channel_id: i32,
        kind: NotificationKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(notified_at) FROM notification_history \
             WHERE domain_id = $1 AND channel_id = $2 AND kind = $3",
        )
        .bind(domain_id)
        .bind(channel_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }
}
