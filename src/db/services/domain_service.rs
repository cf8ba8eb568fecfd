//! Postgres implementation of [`DomainStore`] on top of the sea-orm
//! entities. Multi-step writes that must be atomic (registration rounds,
//! domain deletion with history cleanup) run inside a transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::db::entities::{domain, monitor_registration, notification_history, prelude::*};
use crate::db::enums::{Region, RegistrationState};
use crate::db::store::{DomainStore, NewDomain, NewRegistration, StoreError};
use crate::providers::CheckResult;

const LIVE_STATES: [&str; 2] = ["PENDING", "ACTIVE"];

pub struct PgDomainStore {
    db: DatabaseConnection,
}

impl PgDomainStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn region_codes(regions: &[Region]) -> serde_json::Value {
    serde_json::json!(regions.iter().map(|r| r.as_code()).collect::<Vec<_>>())
}

#[async_trait]
impl DomainStore for PgDomainStore {
    async fn insert_domain(&self, new: NewDomain) -> Result<DomainModel, StoreError> {
        let now = Utc::now();
        let model = domain::ActiveModel {
            user_id: Set(new.user_id),
            url: Set(new.url),
            region: Set(new.region.as_code().to_string()),
            interval_minutes: Set(new.interval.minutes()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn domains_for_user(&self, user_id: i32) -> Result<Vec<DomainModel>, StoreError> {
        Ok(Domain::find()
            .filter(domain::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?)
    }

    async fn save_registrations(
        &self,
        domain_id: i32,
        registrations: Vec<NewRegistration>,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        for reg in registrations {
            let state = if reg.external_id.is_some() {
                RegistrationState::Active
            } else {
                RegistrationState::Pending
            };
            let model = monitor_registration::ActiveModel {
                domain_id: Set(domain_id),
                provider: Set(reg.provider),
                external_id: Set(reg.external_id),
                regions: Set(region_codes(&reg.regions)),
                state: Set(state.as_str().to_string()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            model.insert(&txn).await?;
        }
        txn.commit().await?;
        Ok(())
    }

    async fn live_registrations(
        &self,
        domain_id: i32,
    ) -> Result<Vec<MonitorRegistrationModel>, StoreError> {
        Ok(MonitorRegistration::find()
            .filter(monitor_registration::Column::DomainId.eq(domain_id))
            .filter(monitor_registration::Column::ExternalId.is_not_null())
            .filter(monitor_registration::Column::State.is_in(LIVE_STATES))
            .all(&self.db)
            .await?)
    }

    async fn set_registration_state(
        &self,
        registration_ids: &[i32],
        state: RegistrationState,
    ) -> Result<(), StoreError> {
        if registration_ids.is_empty() {
            return Ok(());
        }
        MonitorRegistration::update_many()
            .col_expr(
                monitor_registration::Column::State,
                Expr::value(state.as_str()),
            )
            .col_expr(
                monitor_registration::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(monitor_registration::Column::Id.is_in(registration_ids.to_vec()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn delete_domain(&self, domain_id: i32) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;
        NotificationHistory::delete_many()
            .filter(notification_history::Column::DomainId.eq(domain_id))
            .exec(&txn)
            .await?;
        MonitorRegistration::delete_many()
            .filter(monitor_registration::Column::DomainId.eq(domain_id))
            .exec(&txn)
            .await?;
        Domain::delete_by_id(domain_id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn domains_to_reconcile(
        &self,
    ) -> Result<Vec<(DomainModel, Vec<MonitorRegistrationModel>)>, StoreError> {
        let domains = Domain::find()
            .filter(domain::Column::IsActive.eq(true))
            .all(&self.db)
            .await?;
        if domains.is_empty() {
            return Ok(Vec::new());
        }

        let domain_ids: Vec<i32> = domains.iter().map(|d| d.id).collect();
        let registrations = MonitorRegistration::find()
            .filter(monitor_registration::Column::DomainId.is_in(domain_ids))
            .filter(monitor_registration::Column::ExternalId.is_not_null())
            .filter(monitor_registration::Column::State.is_in(LIVE_STATES))
            .all(&self.db)
            .await?;

        let mut by_domain: HashMap<i32, Vec<MonitorRegistrationModel>> = HashMap::new();
        for reg in registrations {
            by_domain.entry(reg.domain_id).or_default().push(reg);
        }

        Ok(domains
            .into_iter()
            .filter_map(|d| by_domain.remove(&d.id).map(|regs| (d, regs)))
            .collect())
    }

    async fn record_check(
        &self,
        domain_id: i32,
        check: &CheckResult,
    ) -> Result<DomainModel, StoreError> {
        let found = Domain::find_by_id(domain_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::DomainNotFound(domain_id))?;

        let mut active: domain::ActiveModel = found.into();
        active.last_status_code = Set(Some(check.status_code));
        active.last_error_code = Set(Some(check.error_code));
        active.last_error_description = Set(Some(check.error_description.clone()));
        active.last_total_time_ms = Set(Some(check.total_time_ms));
        active.last_checked_at = Set(Some(check.checked_at));
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }
}
