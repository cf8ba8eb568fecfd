//! Shared service wiring.
//!
//! Everything the embedding API surface needs to drive the core lives in
//! one context struct: the orchestrator for domain lifecycle events, the
//! dispatcher for ad-hoc sends, and the stores for reads.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{DatabaseConnection, SqlxPostgresConnector};
use sqlx::PgPool;
use tracing::warn;

use crate::db::services::{PgChannelStore, PgDomainStore, PgHistoryStore};
use crate::db::store::{ChannelStore, DomainStore, HistoryStore};
use crate::monitor::orchestrator::MonitorOrchestrator;
use crate::monitor::reconciler::StatusReconciler;
use crate::notifications::dispatcher::NotificationDispatcher;
use crate::notifications::encryption::EncryptionService;
use crate::notifications::models::{CHANNEL_EMAIL, CHANNEL_TELEGRAM};
use crate::notifications::senders::{
    email::EmailSender, telegram::TelegramSender, NotificationSender,
};
use crate::providers::site24x7::Site24x7Client;
use crate::providers::uptrends::UptrendsClient;
use crate::providers::ProviderClient;
use crate::server::config::ServerConfig;

pub struct CoreServices {
    pub orchestrator: Arc<MonitorOrchestrator>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub reconciler: Arc<StatusReconciler>,
    pub domain_store: Arc<dyn DomainStore>,
    pub channel_store: Arc<dyn ChannelStore>,
    pub history_store: Arc<dyn HistoryStore>,
}

impl CoreServices {
    pub fn build(
        config: &ServerConfig,
        pg_pool: PgPool,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let db: DatabaseConnection =
            SqlxPostgresConnector::from_sqlx_postgres_pool(pg_pool.clone());

        let encryption = Arc::new(EncryptionService::from_hex_key(
            &config.channel_encryption_key,
        )?);

        let mut providers: Vec<Arc<dyn ProviderClient>> = Vec::new();
        if let Some(section) = config.uptrends.clone() {
            providers.push(Arc::new(UptrendsClient::new(section.into())?));
        }
        if let Some(section) = config.site24x7.clone() {
            providers.push(Arc::new(Site24x7Client::new(section.into())?));
        }
        if providers.is_empty() {
            warn!("no monitoring providers configured, domains will never be probed");
        }

        let domain_store: Arc<dyn DomainStore> = Arc::new(PgDomainStore::new(db.clone()));
        let channel_store: Arc<dyn ChannelStore> = Arc::new(PgChannelStore::new(db));
        let history_store: Arc<dyn HistoryStore> = Arc::new(PgHistoryStore::new(pg_pool));

        let mut senders: HashMap<&'static str, Arc<dyn NotificationSender>> = HashMap::new();
        senders.insert(CHANNEL_TELEGRAM, Arc::new(TelegramSender::new()));
        senders.insert(CHANNEL_EMAIL, Arc::new(EmailSender::new()));

        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&channel_store),
            Arc::clone(&history_store),
            encryption,
            senders,
        ));

        let orchestrator =
            MonitorOrchestrator::new(providers.clone(), Arc::clone(&domain_store));
        let reconciler = Arc::new(StatusReconciler::new(
            Arc::clone(&domain_store),
            Arc::clone(&dispatcher),
            providers,
        ));

        Ok(Self {
            orchestrator,
            dispatcher,
            reconciler,
            domain_store,
            channel_store,
            history_store,
        })
    }
}
