//! Test doubles: in-memory stores, a recording provider and a recording
//! sender, each with injectable failure switches so the compensation and
//! continue-on-error paths can be driven deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::db::entities::prelude::*;
use crate::db::enums::{CheckInterval, NotificationKind, Region, RegistrationState};
use crate::db::store::{
    ChannelStore, DomainStore, HistoryRecord, HistoryStore, NewDomain, NewRegistration,
    StoreError,
};
use crate::notifications::encryption::EncryptionService;
use crate::notifications::models::ChannelPayload;
use crate::notifications::senders::{NotificationSender, SenderError};
use crate::providers::{CheckResult, ProviderClient, ProviderError};

const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

static TEST_ENCRYPTION: Lazy<Arc<EncryptionService>> = Lazy::new(|| {
    Arc::new(EncryptionService::from_hex_key(TEST_KEY).expect("static test key is valid"))
});

pub fn test_encryption() -> Arc<EncryptionService> {
    Arc::clone(&TEST_ENCRYPTION)
}

pub fn sealed_telegram_payload() -> Vec<u8> {
    let payload = ChannelPayload::Telegram {
        bot_token: "123:abc".to_string(),
        chat_id: "42".to_string(),
    };
    let json = serde_json::to_vec(&payload).expect("payload serializes");
    test_encryption().encrypt(&json).expect("payload encrypts")
}

pub fn domain_model(user_id: i32, interval_minutes: i32, region: &str) -> DomainModel {
    DomainModel {
        id: 1,
        user_id,
        url: "https://example.com".to_string(),
        region: region.to_string(),
        interval_minutes,
        is_active: true,
        last_status_code: None,
        last_error_code: None,
        last_error_description: None,
        last_total_time_ms: None,
        last_checked_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn channel_config(id: i32) -> ChannelConfigModel {
    ChannelConfigModel {
        id,
        user_id: 1,
        name: format!("channel-{id}"),
        channel_type: "telegram".to_string(),
        payload: Vec::new(),
        is_active: true,
        notify_on_down: true,
        notify_on_up: true,
        regions: serde_json::json!([]),
        language: "en".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn injected_db_error(context: &str) -> StoreError {
    StoreError::Database(sea_orm::DbErr::Custom(format!("injected: {context}")))
}

// ===== MockDomainStore =====

#[derive(Default)]
struct DomainStoreState {
    domains: Vec<DomainModel>,
    registrations: Vec<MonitorRegistrationModel>,
    deleted_domains: Vec<i32>,
    next_domain_id: i32,
    next_registration_id: i32,
    fail_save_registrations: bool,
    fail_insert_url: Option<String>,
}

pub struct MockDomainStore {
    state: Mutex<DomainStoreState>,
}

impl MockDomainStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DomainStoreState {
                next_domain_id: 100,
                next_registration_id: 1,
                ..Default::default()
            }),
        }
    }

    pub fn seed_domain(&self, domain: DomainModel) {
        self.state.lock().unwrap().domains.push(domain);
    }

    pub fn seed_live_registration(&self, domain_id: i32, provider: &str, external_id: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_registration_id;
        state.next_registration_id += 1;
        state.registrations.push(MonitorRegistrationModel {
            id,
            domain_id,
            provider: provider.to_string(),
            external_id: Some(external_id.to_string()),
            regions: serde_json::json!(["US"]),
            state: RegistrationState::Active.as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
    }

    pub fn fail_save_registrations(&self) {
        self.state.lock().unwrap().fail_save_registrations = true;
    }

    pub fn fail_insert_for(&self, url: &str) {
        self.state.lock().unwrap().fail_insert_url = Some(url.to_string());
    }

    /// Live (not deleted) registrations recorded for a domain, as the
    /// orchestrator-facing input type for easy assertions.
    pub fn saved_registrations(&self, domain_id: i32) -> Vec<NewRegistration> {
        let state = self.state.lock().unwrap();
        state
            .registrations
            .iter()
            .filter(|r| {
                r.domain_id == domain_id
                    && r.state != RegistrationState::Deleted.as_str()
            })
            .map(|r| NewRegistration {
                provider: r.provider.clone(),
                external_id: r.external_id.clone(),
                regions: serde_json::from_value::<Vec<String>>(r.regions.clone())
                    .unwrap_or_default()
                    .iter()
                    .map(|c| Region::parse_lossy(c))
                    .collect(),
            })
            .collect()
    }

    pub fn domain(&self, domain_id: i32) -> Option<DomainModel> {
        let state = self.state.lock().unwrap();
        state.domains.iter().find(|d| d.id == domain_id).cloned()
    }

    pub fn domain_deleted(&self, domain_id: i32) -> bool {
        self.state.lock().unwrap().deleted_domains.contains(&domain_id)
    }

    pub fn registration_states(&self, domain_id: i32) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .registrations
            .iter()
            .filter(|r| r.domain_id == domain_id)
            .map(|r| r.state.clone())
            .collect()
    }
}

#[async_trait]
impl DomainStore for MockDomainStore {
    async fn insert_domain(&self, new: NewDomain) -> Result<DomainModel, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_insert_url.as_deref() == Some(new.url.as_str()) {
            return Err(injected_db_error("insert_domain"));
        }
        let id = state.next_domain_id;
        state.next_domain_id += 1;
        let domain = DomainModel {
            id,
            user_id: new.user_id,
            url: new.url,
            region: new.region.as_code().to_string(),
            interval_minutes: new.interval.minutes(),
            is_active: true,
            last_status_code: None,
            last_error_code: None,
            last_error_description: None,
            last_total_time_ms: None,
            last_checked_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        state.domains.push(domain.clone());
        Ok(domain)
    }

    async fn domains_for_user(&self, user_id: i32) -> Result<Vec<DomainModel>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .domains
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn save_registrations(
        &self,
        domain_id: i32,
        registrations: Vec<NewRegistration>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_save_registrations {
            return Err(injected_db_error("save_registrations"));
        }
        for reg in registrations {
            let id = state.next_registration_id;
            state.next_registration_id += 1;
            let reg_state = if reg.external_id.is_some() {
                RegistrationState::Active
            } else {
                RegistrationState::Pending
            };
            state.registrations.push(MonitorRegistrationModel {
                id,
                domain_id,
                provider: reg.provider,
                external_id: reg.external_id,
                regions: serde_json::json!(reg
                    .regions
                    .iter()
                    .map(|r| r.as_code())
                    .collect::<Vec<_>>()),
                state: reg_state.as_str().to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn live_registrations(
        &self,
        domain_id: i32,
    ) -> Result<Vec<MonitorRegistrationModel>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .registrations
            .iter()
            .filter(|r| r.domain_id == domain_id && r.is_live())
            .cloned()
            .collect())
    }

    async fn set_registration_state(
        &self,
        registration_ids: &[i32],
        new_state: RegistrationState,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for reg in state.registrations.iter_mut() {
            if registration_ids.contains(&reg.id) {
                reg.state = new_state.as_str().to_string();
            }
        }
        Ok(())
    }

    async fn delete_domain(&self, domain_id: i32) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.domains.retain(|d| d.id != domain_id);
        state.registrations.retain(|r| r.domain_id != domain_id);
        state.deleted_domains.push(domain_id);
        Ok(())
    }

    async fn domains_to_reconcile(
        &self,
    ) -> Result<Vec<(DomainModel, Vec<MonitorRegistrationModel>)>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .domains
            .iter()
            .filter(|d| d.is_active)
            .filter_map(|d| {
                let regs: Vec<MonitorRegistrationModel> = state
                    .registrations
                    .iter()
                    .filter(|r| r.domain_id == d.id && r.is_live())
                    .cloned()
                    .collect();
                if regs.is_empty() {
                    None
                } else {
                    Some((d.clone(), regs))
                }
            })
            .collect())
    }

    async fn record_check(
        &self,
        domain_id: i32,
        check: &CheckResult,
    ) -> Result<DomainModel, StoreError> {
        let mut state = self.state.lock().unwrap();
        let domain = state
            .domains
            .iter_mut()
            .find(|d| d.id == domain_id)
            .ok_or(StoreError::DomainNotFound(domain_id))?;
        domain.last_status_code = Some(check.status_code);
        domain.last_error_code = Some(check.error_code);
        domain.last_error_description = Some(check.error_description.clone());
        domain.last_total_time_ms = Some(check.total_time_ms);
        domain.last_checked_at = Some(check.checked_at);
        domain.updated_at = Utc::now();
        Ok(domain.clone())
    }
}

// ===== MockChannelStore =====

pub struct MockChannelStore {
    channels: Mutex<HashMap<i32, Vec<ChannelConfigModel>>>,
}

impl MockChannelStore {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, user_id: i32, configs: Vec<ChannelConfigModel>) {
        self.channels.lock().unwrap().insert(user_id, configs);
    }
}

#[async_trait]
impl ChannelStore for MockChannelStore {
    async fn channels_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<ChannelConfigModel>, StoreError> {
        Ok(self
            .channels
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ===== MockHistoryStore =====

pub struct MockHistoryStore {
    appended: Mutex<Vec<HistoryRecord>>,
    seeded: Mutex<HashMap<(i32, i32, NotificationKind), DateTime<Utc>>>,
}

impl MockHistoryStore {
    pub fn new() -> Self {
        Self {
            appended: Mutex::new(Vec::new()),
            seeded: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_last(
        &self,
        domain_id: i32,
        channel_id: i32,
        kind: NotificationKind,
        at: DateTime<Utc>,
    ) {
        self.seeded
            .lock()
            .unwrap()
            .insert((domain_id, channel_id, kind), at);
    }

    pub fn appended_count(&self) -> usize {
        self.appended.lock().unwrap().len()
    }

    pub fn appended_kinds(&self) -> Vec<NotificationKind> {
        self.appended.lock().unwrap().iter().map(|r| r.kind).collect()
    }
}

#[async_trait]
impl HistoryStore for MockHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), StoreError> {
        self.appended.lock().unwrap().push(record);
        Ok(())
    }

    async fn last_notified_at(
        &self,
        domain_id: i32,
        channel_id: i32,
        kind: NotificationKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let seeded = self
            .seeded
            .lock()
            .unwrap()
            .get(&(domain_id, channel_id, kind))
            .copied();
        let appended = self
            .appended
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.domain_id == domain_id && r.channel_id == channel_id && r.kind == kind)
            .map(|r| r.notified_at)
            .max();
        Ok([seeded, appended].into_iter().flatten().max())
    }
}

// ===== MockProvider =====

pub struct MockProvider {
    name: &'static str,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    update_calls: AtomicUsize,
    next_id: AtomicI32,
    fail_creates: Mutex<bool>,
    fail_deletes: Mutex<bool>,
    fail_updates: Mutex<bool>,
    latest_check: Mutex<Option<CheckResult>>,
    fail_latest_for: Mutex<Option<String>>,
}

impl MockProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            next_id: AtomicI32::new(1),
            fail_creates: Mutex::new(false),
            fail_deletes: Mutex::new(false),
            fail_updates: Mutex::new(false),
            latest_check: Mutex::new(None),
            fail_latest_for: Mutex::new(None),
        }
    }

    pub fn fail_creates(&self) {
        *self.fail_creates.lock().unwrap() = true;
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().unwrap() = true;
    }

    pub fn fail_updates(&self) {
        *self.fail_updates.lock().unwrap() = true;
    }

    pub fn set_latest_check(&self, check: Option<CheckResult>) {
        *self.latest_check.lock().unwrap() = check;
    }

    pub fn fail_latest_check_for(&self, external_id: &str) {
        *self.fail_latest_for.lock().unwrap() = Some(external_id.to_string());
    }

    pub fn create_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn api_error(&self, operation: &'static str) -> ProviderError {
        ProviderError::Api {
            provider: self.name,
            operation,
            status: 500,
            body: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn create_monitor(
        &self,
        _url: &str,
        _display_name: &str,
        _interval: CheckInterval,
        _regions: &[Region],
    ) -> Result<String, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_creates.lock().unwrap() {
            return Err(self.api_error("create_monitor"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-{}", self.name, id))
    }

    async fn update_monitor_status(
        &self,
        _external_id: &str,
        _active: bool,
    ) -> Result<(), ProviderError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_updates.lock().unwrap() {
            return Err(self.api_error("update_monitor_status"));
        }
        Ok(())
    }

    async fn delete_monitor(&self, _external_id: &str) -> Result<(), ProviderError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_deletes.lock().unwrap() {
            return Err(self.api_error("delete_monitor"));
        }
        Ok(())
    }

    async fn latest_check(
        &self,
        external_id: &str,
        _region: Region,
    ) -> Result<Option<CheckResult>, ProviderError> {
        if self.fail_latest_for.lock().unwrap().as_deref() == Some(external_id) {
            return Err(self.api_error("latest_check"));
        }
        Ok(self.latest_check.lock().unwrap().clone())
    }
}

// ===== RecordingSender =====

pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    failures_remaining: AtomicUsize,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures_remaining: AtomicUsize::new(0),
        }
    }

    /// The next `count` sends fail with a send error.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(
        &self,
        _payload: &ChannelPayload,
        subject: &str,
        body: &str,
    ) -> Result<(), SenderError> {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SenderError::SendFailed("injected failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}
