//! Persistence seams consumed by the orchestrator, reconciler and
//! dispatcher. The database is the source of truth for domains,
//! registrations, channel configs and history; the traits here exist so the
//! components above them can be exercised against in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::entities::prelude::*;
use crate::db::enums::{CheckInterval, NotificationKind, Region, RegistrationState};
use crate::providers::CheckResult;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),
    #[error("domain {0} not found")]
    DomainNotFound(i32),
}

/// Input for a new domain row; validation happens before this is built.
#[derive(Debug, Clone)]
pub struct NewDomain {
    pub user_id: i32,
    pub url: String,
    pub region: Region,
    pub interval: CheckInterval,
}

/// One provider's outcome of a provisioning round. `external_id` is None
/// when that provider's create failed; the row is still persisted so the
/// failure is visible.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub provider: String,
    pub external_id: Option<String>,
    pub regions: Vec<Region>,
}

#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn insert_domain(&self, new: NewDomain) -> Result<DomainModel, StoreError>;

    async fn domains_for_user(&self, user_id: i32) -> Result<Vec<DomainModel>, StoreError>;

    /// Persists the registrations obtained from one provisioning round in a
    /// single transaction. If this fails, the caller must compensate by
    /// deleting the remote monitors it created.
    async fn save_registrations(
        &self,
        domain_id: i32,
        registrations: Vec<NewRegistration>,
    ) -> Result<(), StoreError>;

    /// Registrations with a non-null external id that are not yet deleted.
    async fn live_registrations(
        &self,
        domain_id: i32,
    ) -> Result<Vec<MonitorRegistrationModel>, StoreError>;

    /// Moves registrations to a terminal state: `Deleted` when the remote
    /// object is gone, `OrphanedPendingDelete` when the remote delete failed
    /// and the object needs manual cleanup.
    async fn set_registration_state(
        &self,
        registration_ids: &[i32],
        state: RegistrationState,
    ) -> Result<(), StoreError>;

    /// Removes the domain, its registrations and its notification history
    /// in one transaction.
    async fn delete_domain(&self, domain_id: i32) -> Result<(), StoreError>;

    /// Active domains that have at least one live registration, paired with
    /// those registrations.
    async fn domains_to_reconcile(
        &self,
    ) -> Result<Vec<(DomainModel, Vec<MonitorRegistrationModel>)>, StoreError>;

    /// Writes the status fields observed by a check and returns the updated
    /// domain.
    async fn record_check(
        &self,
        domain_id: i32,
        check: &CheckResult,
    ) -> Result<DomainModel, StoreError>;
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn channels_for_user(&self, user_id: i32) -> Result<Vec<ChannelConfigModel>, StoreError>;
}

/// Audit row written after a successful send.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub domain_id: i32,
    pub channel_id: i32,
    pub kind: NotificationKind,
    pub status_code: Option<i32>,
    pub error_description: Option<String>,
    pub notified_at: DateTime<Utc>,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> Result<(), StoreError>;

    /// Latest send time for the (domain, channel, kind) tuple, if any.
    async fn last_notified_at(
        &self,
        domain_id: i32,
        channel_id: i32,
        kind: NotificationKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
}
