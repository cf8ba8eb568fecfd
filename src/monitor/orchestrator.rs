//! Monitor lifecycle orchestration across all configured providers.
//!
//! Domain CRUD succeeds or fails on local persistence alone; provider
//! monitors are provisioned in the background and provider failures never
//! surface to the caller. The one hard rule: a remote monitor whose id was
//! not persisted locally must not outlive the attempt — persistence failure
//! triggers a compensating delete per created monitor.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::db::entities::prelude::DomainModel;
use crate::db::enums::{CheckInterval, Region, RegistrationState};
use crate::db::store::{DomainStore, NewDomain, NewRegistration, StoreError};
use crate::providers::{regions, ProviderClient};

const QUEUE_CAPACITY: usize = 64;
const WORKER_COUNT: usize = 2;
/// Fixed pause before provisioning so a burst of added domains does not
/// slam both providers at once.
const PROVISION_DELAY: Duration = Duration::from_secs(5);
pub const MAX_BATCH_SIZE: usize = 25;

enum ProvisionJob {
    Provision(DomainModel),
}

pub struct MonitorOrchestrator {
    providers: Vec<Arc<dyn ProviderClient>>,
    store: Arc<dyn DomainStore>,
    jobs: mpsc::Sender<ProvisionJob>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchItemStatus {
    Added,
    Duplicate,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub url: String,
    pub status: BatchItemStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchAddOutcome {
    pub added: usize,
    pub results: Vec<BatchItemResult>,
}

#[derive(Debug, Clone)]
pub struct BatchAddRequest {
    pub url: String,
    pub region: String,
    pub interval_minutes: i32,
}

/// Lowercased hostname, the unit of duplicate detection together with the
/// region code.
fn normalized_host(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed.host_str().map(str::to_lowercase)
}

fn display_name_for(domain: &DomainModel) -> String {
    normalized_host(&domain.url).unwrap_or_else(|| domain.url.clone())
}

impl MonitorOrchestrator {
    /// Spawns the provisioning worker pool; the returned handle is shared
    /// by the API layer and the workers for the process lifetime.
    pub fn new(
        providers: Vec<Arc<dyn ProviderClient>>,
        store: Arc<dyn DomainStore>,
    ) -> Arc<Self> {
        let (jobs, rx) = mpsc::channel(QUEUE_CAPACITY);
        let orchestrator = Arc::new(Self {
            providers,
            store,
            jobs,
        });

        let rx = Arc::new(Mutex::new(rx));
        for worker_id in 0..WORKER_COUNT {
            let orchestrator = Arc::clone(&orchestrator);
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(ProvisionJob::Provision(domain)) => {
                            tokio::time::sleep(PROVISION_DELAY).await;
                            orchestrator.provision(&domain).await;
                        }
                        None => {
                            info!(worker_id, "provisioning queue closed, worker exiting");
                            break;
                        }
                    }
                }
            });
        }
        orchestrator
    }

    fn provider_by_name(&self, name: &str) -> Option<&Arc<dyn ProviderClient>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Fire-and-forget: the caller returns before any provider has been
    /// contacted. A freshly added domain is visible without registrations
    /// until a worker gets to it.
    pub fn on_domain_created(&self, domain: DomainModel) {
        let domain_id = domain.id;
        if self
            .jobs
            .try_send(ProvisionJob::Provision(domain))
            .is_err()
        {
            error!(domain_id, "provisioning queue full, dropping job");
        }
    }

    /// One provisioning round: every provider is tried independently, then
    /// the combined outcome is persisted atomically. On persistence failure
    /// every created remote monitor is deleted again; a failed compensation
    /// is logged as an orphan and not retried.
    pub(crate) async fn provision(&self, domain: &DomainModel) {
        let region = Region::parse_lossy(&domain.region);
        let interval = CheckInterval::from_minutes(domain.interval_minutes)
            .unwrap_or(CheckInterval::Min60);
        let display_name = display_name_for(domain);

        let registrations: Vec<NewRegistration> =
            join_all(self.providers.iter().map(|provider| {
                let submit = regions::submission_regions(provider.name(), region);
                let display_name = display_name.clone();
                async move {
                    let external_id = match provider
                        .create_monitor(&domain.url, &display_name, interval, &submit)
                        .await
                    {
                        Ok(external_id) => {
                            info!(
                                provider = provider.name(),
                                domain_id = domain.id,
                                external_id = %external_id,
                                "created remote monitor"
                            );
                            Some(external_id)
                        }
                        Err(e) => {
                            warn!(
                                provider = provider.name(),
                                domain_id = domain.id,
                                error = %e,
                                "remote monitor creation failed"
                            );
                            None
                        }
                    };
                    NewRegistration {
                        provider: provider.name().to_string(),
                        external_id,
                        regions: submit,
                    }
                }
            }))
            .await;

        if let Err(e) = self
            .store
            .save_registrations(domain.id, registrations.clone())
            .await
        {
            error!(
                domain_id = domain.id,
                error = %e,
                "failed to persist registrations, deleting created monitors"
            );
            for registration in &registrations {
                let Some(external_id) = &registration.external_id else {
                    continue;
                };
                let Some(provider) = self.provider_by_name(&registration.provider) else {
                    continue;
                };
                if let Err(delete_err) = provider.delete_monitor(external_id).await {
                    warn!(
                        provider = %registration.provider,
                        external_id = %external_id,
                        error = %delete_err,
                        "compensating delete failed, remote monitor orphaned"
                    );
                }
            }
        }
    }

    /// Tears down the old region's monitors and re-provisions with the new
    /// one. The domain has zero live monitors until a worker re-creates
    /// them; that window is accepted.
    pub async fn on_region_changed(&self, domain: DomainModel) {
        match self.store.live_registrations(domain.id).await {
            Ok(registrations) => {
                let mut deleted = Vec::with_capacity(registrations.len());
                let mut orphaned = Vec::new();
                for registration in &registrations {
                    let removed = match (
                        registration.external_id.as_deref(),
                        self.provider_by_name(&registration.provider),
                    ) {
                        (Some(external_id), Some(provider)) => {
                            match provider.delete_monitor(external_id).await {
                                Ok(()) => true,
                                Err(e) => {
                                    warn!(
                                        provider = %registration.provider,
                                        external_id,
                                        error = %e,
                                        "failed to delete old-region monitor"
                                    );
                                    false
                                }
                            }
                        }
                        // Nothing remote to remove.
                        _ => true,
                    };
                    if removed {
                        deleted.push(registration.id);
                    } else {
                        orphaned.push(registration.id);
                    }
                }
                if let Err(e) = self
                    .store
                    .set_registration_state(&deleted, RegistrationState::Deleted)
                    .await
                {
                    error!(domain_id = domain.id, error = %e, "failed to mark registrations deleted");
                }
                if let Err(e) = self
                    .store
                    .set_registration_state(&orphaned, RegistrationState::OrphanedPendingDelete)
                    .await
                {
                    error!(domain_id = domain.id, error = %e, "failed to mark registrations orphaned");
                }
            }
            Err(e) => {
                error!(domain_id = domain.id, error = %e, "failed to load registrations for region change");
            }
        }
        self.on_domain_created(domain);
    }

    /// Propagates the active flag to every live registration. The local
    /// flag is already durable; per-provider failures are logged only.
    // TODO: a provider that misses this update keeps probing (or stays
    // suspended) until the next region change re-creates the monitor; add a
    // periodic active-flag re-sync pass to close that drift.
    pub async fn on_active_changed(&self, domain: &DomainModel, active: bool) {
        let registrations = match self.store.live_registrations(domain.id).await {
            Ok(registrations) => registrations,
            Err(e) => {
                error!(domain_id = domain.id, error = %e, "failed to load registrations for active change");
                return;
            }
        };
        for registration in &registrations {
            let Some(external_id) = &registration.external_id else {
                continue;
            };
            let Some(provider) = self.provider_by_name(&registration.provider) else {
                continue;
            };
            if let Err(e) = provider.update_monitor_status(external_id, active).await {
                warn!(
                    provider = %registration.provider,
                    external_id = %external_id,
                    active,
                    error = %e,
                    "failed to propagate active flag"
                );
            }
        }
    }

    /// Deletes remote monitors best-effort, then the local rows (domain,
    /// registrations, history) in one transaction. Only the local deletion
    /// outcome is the caller's outcome.
    pub async fn on_domain_deleted(&self, domain: &DomainModel) -> Result<(), StoreError> {
        match self.store.live_registrations(domain.id).await {
            Ok(registrations) => {
                for registration in &registrations {
                    let Some(external_id) = &registration.external_id else {
                        continue;
                    };
                    let Some(provider) = self.provider_by_name(&registration.provider) else {
                        continue;
                    };
                    if let Err(e) = provider.delete_monitor(external_id).await {
                        warn!(
                            provider = %registration.provider,
                            external_id = %external_id,
                            error = %e,
                            "failed to delete remote monitor during domain deletion"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(domain_id = domain.id, error = %e, "failed to load registrations before deletion");
            }
        }
        self.store.delete_domain(domain.id).await
    }

    /// Adds up to [`MAX_BATCH_SIZE`] domains with per-item outcomes. One
    /// item's failure never affects the others. Duplicates are detected by
    /// normalized (hostname, region), case-insensitive, both within the
    /// batch and against the user's stored domains.
    pub async fn add_domains(
        &self,
        user_id: i32,
        batch: Vec<BatchAddRequest>,
    ) -> Result<BatchAddOutcome, StoreError> {
        let existing = self.store.domains_for_user(user_id).await?;
        let mut seen: HashSet<(String, String)> = existing
            .iter()
            .filter_map(|d| {
                normalized_host(&d.url).map(|host| (host, d.region.to_ascii_uppercase()))
            })
            .collect();

        let mut results = Vec::with_capacity(batch.len());
        let mut added = 0;
        for (index, item) in batch.into_iter().enumerate() {
            if index >= MAX_BATCH_SIZE {
                results.push(BatchItemResult {
                    url: item.url,
                    status: BatchItemStatus::Failed,
                    reason: Some(format!("batch limit of {MAX_BATCH_SIZE} exceeded")),
                });
                continue;
            }
            let Some(region) = Region::from_code(&item.region) else {
                results.push(BatchItemResult {
                    url: item.url,
                    status: BatchItemStatus::Failed,
                    reason: Some(format!("unknown region: {}", item.region)),
                });
                continue;
            };
            let Some(interval) = CheckInterval::from_minutes(item.interval_minutes) else {
                results.push(BatchItemResult {
                    url: item.url,
                    status: BatchItemStatus::Failed,
                    reason: Some(format!(
                        "unsupported interval: {} minutes",
                        item.interval_minutes
                    )),
                });
                continue;
            };
            let Some(host) = normalized_host(&item.url) else {
                results.push(BatchItemResult {
                    url: item.url,
                    status: BatchItemStatus::Failed,
                    reason: Some("invalid url".to_string()),
                });
                continue;
            };

            if !seen.insert((host, region.as_code().to_string())) {
                results.push(BatchItemResult {
                    url: item.url,
                    status: BatchItemStatus::Duplicate,
                    reason: None,
                });
                continue;
            }

            match self
                .store
                .insert_domain(NewDomain {
                    user_id,
                    url: item.url.clone(),
                    region,
                    interval,
                })
                .await
            {
                Ok(domain) => {
                    added += 1;
                    results.push(BatchItemResult {
                        url: item.url,
                        status: BatchItemStatus::Added,
                        reason: None,
                    });
                    self.on_domain_created(domain);
                }
                Err(e) => {
                    warn!(user_id, url = %item.url, error = %e, "failed to insert domain");
                    results.push(BatchItemResult {
                        url: item.url,
                        status: BatchItemStatus::Failed,
                        reason: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(BatchAddOutcome { added, results })
    }
}
