//! Uptrends gateway.
//!
//! Uptrends identifies probe origins by numeric checkpoint server ids and
//! authenticates with API-account basic auth. The account is limited to one
//! request per second, enforced here by the shared limiter.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::rate_limit::RateLimiter;
use super::regions;
use super::{CheckResult, ProviderClient, ProviderError, PROVIDER_UPTRENDS};
use crate::db::enums::{CheckInterval, Region};

const DEFAULT_BASE_URL: &str = "https://api.uptrends.com/v4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CALL_PERIOD: Duration = Duration::from_secs(1);

/// Ordered list of timestamp formats observed in check responses. The API
/// is not consistent about fractional seconds or timezone suffixes.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

#[derive(Debug, Clone)]
pub struct UptrendsConfig {
    pub api_user: String,
    pub api_password: String,
    pub base_url: Option<String>,
}

pub struct UptrendsClient {
    client: Client,
    base_url: String,
    api_user: String,
    api_password: String,
    limiter: RateLimiter,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateMonitorRequest<'a> {
    name: &'a str,
    url: &'a str,
    monitor_type: &'a str,
    check_interval: i32,
    is_active: bool,
    selected_checkpoints: SelectedCheckpoints,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SelectedCheckpoints {
    checkpoints: Vec<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateMonitorResponse {
    monitor_guid: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateMonitorRequest {
    is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct MonitorCheck {
    #[serde(default)]
    pub error_code: i32,
    #[serde(default)]
    pub http_status_code: i32,
    #[serde(default)]
    pub total_time: f64,
    pub checkpoint_id: u32,
    pub timestamp: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl UptrendsClient {
    pub fn new(config: UptrendsConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_user: config.api_user,
            api_password: config.api_password,
            limiter: RateLimiter::new(CALL_PERIOD),
        })
    }

    fn monitor_type_for(url: &str) -> &'static str {
        if url.starts_with("https://") {
            "Https"
        } else {
            "Http"
        }
    }

    async fn error_for(
        operation: &'static str,
        response: reqwest::Response,
    ) -> ProviderError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        ProviderError::Api {
            provider: PROVIDER_UPTRENDS,
            operation,
            status,
            body,
        }
    }
}

/// Parses a check timestamp, trying each known format in order. A value no
/// format accepts degrades to the current time instead of failing the call.
pub(crate) fn parse_check_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return naive.and_utc();
        }
    }
    warn!(timestamp = raw, "unparseable uptrends check timestamp, using now");
    Utc::now()
}

/// Filters checks down to the requested region's checkpoints and returns
/// the most recent one.
pub(crate) fn latest_for_region(checks: &[MonitorCheck], region: Region) -> Option<&MonitorCheck> {
    let checkpoints = regions::uptrends_checkpoints(region);
    checks
        .iter()
        .filter(|check| checkpoints.contains(&check.checkpoint_id))
        .max_by_key(|check| parse_check_timestamp(&check.timestamp))
}

fn to_check_result(check: &MonitorCheck) -> CheckResult {
    let status_code = check.http_status_code;
    CheckResult {
        status_code,
        total_time_ms: check.total_time.round() as i32,
        error_code: check.error_code,
        error_description: check.error_description.clone().unwrap_or_default(),
        available: check.error_code == 0 && (200..400).contains(&status_code),
        checked_at: parse_check_timestamp(&check.timestamp),
    }
}

#[async_trait::async_trait]
impl ProviderClient for UptrendsClient {
    fn name(&self) -> &'static str {
        PROVIDER_UPTRENDS
    }

    async fn create_monitor(
        &self,
        url: &str,
        display_name: &str,
        interval: CheckInterval,
        submit_regions: &[Region],
    ) -> Result<String, ProviderError> {
        self.limiter.acquire().await;

        let mut checkpoints = Vec::new();
        for region in submit_regions {
            checkpoints.extend_from_slice(regions::uptrends_checkpoints(*region));
        }

        let body = CreateMonitorRequest {
            name: display_name,
            url,
            monitor_type: Self::monitor_type_for(url),
            check_interval: interval.minutes(),
            is_active: true,
            selected_checkpoints: SelectedCheckpoints { checkpoints },
        };

        let response = self
            .client
            .post(format!("{}/Monitor", self.base_url))
            .basic_auth(&self.api_user, Some(&self.api_password))
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER_UPTRENDS,
                operation: "create_monitor",
                source,
            })?;

        if !response.status().is_success() {
            return Err(Self::error_for("create_monitor", response).await);
        }

        let created: CreateMonitorResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed {
                    provider: PROVIDER_UPTRENDS,
                    operation: "create_monitor",
                    detail: e.to_string(),
                })?;
        Ok(created.monitor_guid)
    }

    async fn update_monitor_status(
        &self,
        external_id: &str,
        active: bool,
    ) -> Result<(), ProviderError> {
        self.limiter.acquire().await;

        let response = self
            .client
            .patch(format!("{}/Monitor/{}", self.base_url, external_id))
            .basic_auth(&self.api_user, Some(&self.api_password))
            .json(&UpdateMonitorRequest { is_active: active })
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER_UPTRENDS,
                operation: "update_monitor_status",
                source,
            })?;

        if !response.status().is_success() {
            return Err(Self::error_for("update_monitor_status", response).await);
        }
        Ok(())
    }

    async fn delete_monitor(&self, external_id: &str) -> Result<(), ProviderError> {
        self.limiter.acquire().await;

        let response = self
            .client
            .delete(format!("{}/Monitor/{}", self.base_url, external_id))
            .basic_auth(&self.api_user, Some(&self.api_password))
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER_UPTRENDS,
                operation: "delete_monitor",
                source,
            })?;

        if !response.status().is_success() {
            return Err(Self::error_for("delete_monitor", response).await);
        }
        Ok(())
    }

    async fn latest_check(
        &self,
        external_id: &str,
        region: Region,
    ) -> Result<Option<CheckResult>, ProviderError> {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(format!(
                "{}/MonitorCheck/Monitor/{}?Sorting=Descending&Take=25",
                self.base_url, external_id
            ))
            .basic_auth(&self.api_user, Some(&self.api_password))
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER_UPTRENDS,
                operation: "latest_check",
                source,
            })?;

        if !response.status().is_success() {
            return Err(Self::error_for("latest_check", response).await);
        }

        let checks: Vec<MonitorCheck> =
            response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed {
                    provider: PROVIDER_UPTRENDS,
                    operation: "latest_check",
                    detail: e.to_string(),
                })?;

        Ok(latest_for_region(&checks, region).map(to_check_result))
    }
}
