//! Gateways to the external uptime-monitoring providers.
//!
//! Each provider is wrapped behind the [`ProviderClient`] trait and a shared
//! per-provider rate limiter; the orchestrator and reconciler never talk to
//! a provider API directly. Providers are best-effort side channels, never
//! sources of truth: their failures are logged with context and do not fail
//! local CRUD flows.

pub mod rate_limit;
pub mod regions;
pub mod site24x7;
pub mod uptrends;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::enums::{CheckInterval, Region};

pub const PROVIDER_UPTRENDS: &str = "uptrends";
pub const PROVIDER_SITE24X7: &str = "site24x7";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} {operation} returned status {status}: {body}")]
    Api {
        provider: &'static str,
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} {operation} transport error: {source}")]
    Transport {
        provider: &'static str,
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned an unusable {operation} response: {detail}")]
    Malformed {
        provider: &'static str,
        operation: &'static str,
        detail: String,
    },
    #[error("{provider} token refresh failed: {detail}")]
    Auth {
        provider: &'static str,
        detail: String,
    },
}

/// The latest probe outcome a provider reports for a monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub status_code: i32,
    pub total_time_ms: i32,
    pub error_code: i32,
    pub error_description: String,
    pub available: bool,
    pub checked_at: DateTime<Utc>,
}

/// One external monitoring provider. Implementations must serialize their
/// own outbound call rate; callers may invoke them from any number of tasks
/// concurrently and will block until the provider's limiter grants a slot.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Registers a remote monitor and returns its externally-assigned id.
    /// The logical interval and regions are mapped to provider-specific
    /// fields inside the gateway. No retries are performed here; the next
    /// reconciliation-relevant event is the retry.
    async fn create_monitor(
        &self,
        url: &str,
        display_name: &str,
        interval: CheckInterval,
        regions: &[Region],
    ) -> Result<String, ProviderError>;

    async fn update_monitor_status(
        &self,
        external_id: &str,
        active: bool,
    ) -> Result<(), ProviderError>;

    async fn delete_monitor(&self, external_id: &str) -> Result<(), ProviderError>;

    /// The most recent check originating from the requested region's
    /// checkpoints. `Ok(None)` means the provider answered but had no
    /// region-matching check yet; that is not an error.
    async fn latest_check(
        &self,
        external_id: &str,
        region: Region,
    ) -> Result<Option<CheckResult>, ProviderError>;
}
