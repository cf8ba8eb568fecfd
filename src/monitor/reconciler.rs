//! Periodic reconciliation of local domain status with provider state.
//!
//! One loop for the process lifetime. Each tick loads every active domain
//! that has a live registration, asks the owning provider for the latest
//! region-matching check, persists the observed status and hands the domain
//! to the dispatcher. Transition detection lives here: this is the only
//! place that still sees the previously persisted availability before
//! overwriting it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::db::entities::prelude::{DomainModel, MonitorRegistrationModel};
use crate::db::enums::Region;
use crate::db::store::DomainStore;
use crate::notifications::dispatcher::NotificationDispatcher;
use crate::providers::ProviderClient;

pub struct StatusReconciler {
    store: Arc<dyn DomainStore>,
    dispatcher: Arc<NotificationDispatcher>,
    providers: HashMap<&'static str, Arc<dyn ProviderClient>>,
}

impl StatusReconciler {
    pub fn new(
        store: Arc<dyn DomainStore>,
        dispatcher: Arc<NotificationDispatcher>,
        providers: Vec<Arc<dyn ProviderClient>>,
    ) -> Self {
        let providers = providers.into_iter().map(|p| (p.name(), p)).collect();
        Self {
            store,
            dispatcher,
            providers,
        }
    }

    /// Runs until process shutdown. A pass that overruns the period simply
    /// delays the next tick; there is no backpressure beyond that.
    pub async fn run(self: Arc<Self>, period: Duration) {
        info!(period_secs = period.as_secs(), "status reconciler started");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    pub(crate) async fn run_cycle(&self) {
        let domains = match self.store.domains_to_reconcile().await {
            Ok(domains) => domains,
            Err(e) => {
                error!(error = %e, "failed to load domains for reconciliation");
                return;
            }
        };
        debug!(count = domains.len(), "reconciliation pass");

        for (domain, registrations) in domains {
            // One domain's failure must not end the pass for the rest.
            self.reconcile_domain(&domain, &registrations).await;
        }
    }

    async fn reconcile_domain(
        &self,
        domain: &DomainModel,
        registrations: &[MonitorRegistrationModel],
    ) {
        let Some((provider, external_id)) = registrations.iter().find_map(|reg| {
            let external_id = reg.external_id.as_deref()?;
            let provider = self.providers.get(reg.provider.as_str())?;
            Some((provider, external_id))
        }) else {
            warn!(
                domain_id = domain.id,
                "no usable registration, skipping reconciliation"
            );
            return;
        };

        let region = Region::parse_lossy(&domain.region);
        let check = match provider.latest_check(external_id, region).await {
            Ok(Some(check)) => check,
            Ok(None) => {
                debug!(
                    domain_id = domain.id,
                    provider = provider.name(),
                    "no region-matching check yet"
                );
                return;
            }
            Err(e) => {
                warn!(
                    domain_id = domain.id,
                    provider = provider.name(),
                    external_id,
                    error = %e,
                    "latest check fetch failed"
                );
                return;
            }
        };

        let was_available = domain.is_available();
        let updated = match self.store.record_check(domain.id, &check).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(domain_id = domain.id, error = %e, "failed to persist check outcome");
                return;
            }
        };

        let transitioned = was_available != updated.is_available();
        self.dispatcher.dispatch(&updated, transitioned).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::NotificationKind;
    use crate::notifications::models::CHANNEL_TELEGRAM;
    use crate::notifications::senders::NotificationSender;
    use crate::providers::{CheckResult, PROVIDER_UPTRENDS};
    use crate::test_utils::{
        channel_config, domain_model, sealed_telegram_payload, test_encryption,
        MockChannelStore, MockDomainStore, MockHistoryStore, MockProvider, RecordingSender,
    };
    use chrono::Utc;

    struct Fixture {
        reconciler: StatusReconciler,
        store: Arc<MockDomainStore>,
        provider: Arc<MockProvider>,
        sender: Arc<RecordingSender>,
        history: Arc<MockHistoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MockDomainStore::new());
        let provider = Arc::new(MockProvider::new(PROVIDER_UPTRENDS));
        let channels = Arc::new(MockChannelStore::new());
        let history = Arc::new(MockHistoryStore::new());
        let sender = Arc::new(RecordingSender::new());

        let mut channel = channel_config(1);
        channel.payload = sealed_telegram_payload();
        channels.put(1, vec![channel]);

        let mut senders: HashMap<&'static str, Arc<dyn NotificationSender>> = HashMap::new();
        senders.insert(CHANNEL_TELEGRAM, Arc::clone(&sender) as _);
        let dispatcher = Arc::new(NotificationDispatcher::new(
            channels as _,
            Arc::clone(&history) as _,
            test_encryption(),
            senders,
        ));

        let reconciler = StatusReconciler::new(
            Arc::clone(&store) as _,
            dispatcher,
            vec![Arc::clone(&provider) as Arc<dyn ProviderClient>],
        );
        Fixture {
            reconciler,
            store,
            provider,
            sender,
            history,
        }
    }

    fn down_check() -> CheckResult {
        CheckResult {
            status_code: 503,
            total_time_ms: 900,
            error_code: 1011,
            error_description: "connection timed out".to_string(),
            available: false,
            checked_at: Utc::now(),
        }
    }

    fn up_check() -> CheckResult {
        CheckResult {
            status_code: 200,
            total_time_ms: 120,
            error_code: 0,
            error_description: String::new(),
            available: true,
            checked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn a_down_check_persists_status_and_notifies() {
        let fx = fixture();
        let mut domain = domain_model(1, 20, "US");
        domain.last_status_code = Some(200);
        domain.last_checked_at = Some(Utc::now());
        fx.store.seed_domain(domain.clone());
        fx.store.seed_live_registration(domain.id, PROVIDER_UPTRENDS, "up-1");
        fx.provider.set_latest_check(Some(down_check()));

        fx.reconciler.run_cycle().await;

        let stored = fx.store.domain(domain.id).unwrap();
        assert_eq!(stored.last_status_code, Some(503));
        assert_eq!(fx.sender.sent_count(), 1);
        assert_eq!(
            fx.history.appended_kinds(),
            vec![NotificationKind::Down]
        );
    }

    #[tokio::test]
    async fn recovery_dispatches_an_up_transition() {
        let fx = fixture();
        let mut domain = domain_model(1, 20, "US");
        domain.last_status_code = Some(503);
        domain.last_checked_at = Some(Utc::now());
        fx.store.seed_domain(domain.clone());
        fx.store.seed_live_registration(domain.id, PROVIDER_UPTRENDS, "up-1");
        fx.provider.set_latest_check(Some(up_check()));

        fx.reconciler.run_cycle().await;

        assert_eq!(fx.history.appended_kinds(), vec![NotificationKind::Up]);
    }

    #[tokio::test]
    async fn an_unchanged_status_is_a_status_kind() {
        let fx = fixture();
        let mut domain = domain_model(1, 20, "US");
        domain.last_status_code = Some(200);
        domain.last_checked_at = Some(Utc::now());
        fx.store.seed_domain(domain.clone());
        fx.store.seed_live_registration(domain.id, PROVIDER_UPTRENDS, "up-1");
        fx.provider.set_latest_check(Some(up_check()));

        fx.reconciler.run_cycle().await;

        assert_eq!(fx.history.appended_kinds(), vec![NotificationKind::Status]);
    }

    #[tokio::test]
    async fn a_provider_error_skips_the_domain_but_not_the_pass() {
        let fx = fixture();
        let failing = domain_model(1, 20, "US");
        fx.store.seed_domain(failing.clone());
        fx.store.seed_live_registration(failing.id, PROVIDER_UPTRENDS, "up-1");

        let mut healthy = domain_model(1, 20, "US");
        healthy.id = 2;
        healthy.url = "https://two.example".to_string();
        fx.store.seed_domain(healthy.clone());
        fx.store.seed_live_registration(healthy.id, PROVIDER_UPTRENDS, "up-2");

        fx.provider.fail_latest_check_for("up-1");
        fx.provider.set_latest_check(Some(down_check()));

        fx.reconciler.run_cycle().await;

        // The second domain was still reconciled.
        let stored = fx.store.domain(healthy.id).unwrap();
        assert_eq!(stored.last_status_code, Some(503));
    }

    #[tokio::test]
    async fn no_region_matching_check_changes_nothing() {
        let fx = fixture();
        let domain = domain_model(1, 20, "US");
        fx.store.seed_domain(domain.clone());
        fx.store.seed_live_registration(domain.id, PROVIDER_UPTRENDS, "up-1");
        fx.provider.set_latest_check(None);

        fx.reconciler.run_cycle().await;

        let stored = fx.store.domain(domain.id).unwrap();
        assert!(stored.last_checked_at.is_none());
        assert_eq!(fx.sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn the_first_successful_check_is_an_up_transition() {
        // A never-checked domain counts as unavailable, so the first good
        // check flips availability.
        let fx = fixture();
        let domain = domain_model(1, 20, "US");
        fx.store.seed_domain(domain.clone());
        fx.store.seed_live_registration(domain.id, PROVIDER_UPTRENDS, "up-1");
        fx.provider.set_latest_check(Some(up_check()));

        fx.reconciler.run_cycle().await;

        assert_eq!(fx.history.appended_kinds(), vec![NotificationKind::Up]);
    }
}
