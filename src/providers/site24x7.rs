//! Site24x7 gateway.
//!
//! Site24x7 sits behind Zoho OAuth: API calls carry a short-lived access
//! token minted from a long-lived refresh token. The token is cached with
//! an expiry safety margin behind a read/write lock; the read path returns
//! the cached token, the write path re-checks before refreshing so
//! concurrent expirations trigger a single refresh. The account allows two
//! requests per second.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::rate_limit::RateLimiter;
use super::regions;
use super::{CheckResult, ProviderClient, ProviderError, PROVIDER_SITE24X7};
use crate::db::enums::{CheckInterval, Region};

const DEFAULT_BASE_URL: &str = "https://www.site24x7.com/api";
const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.zoho.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CALL_PERIOD: Duration = Duration::from_millis(500);
/// Refresh this long before the token's nominal expiry.
const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct Site24x7Config {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub base_url: Option<String>,
    pub accounts_url: Option<String>,
}

pub struct Site24x7Client {
    client: Client,
    base_url: String,
    accounts_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token: RwLock<Option<CachedToken>>,
    limiter: RateLimiter,
}

#[derive(Debug, Clone)]
pub(crate) struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct CreatedMonitor {
    monitor_id: String,
}

#[derive(Deserialize)]
struct LogReport {
    #[serde(default)]
    report: Vec<LogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LogEntry {
    /// "1" for a successful probe, "0" otherwise.
    #[serde(default)]
    pub availability: String,
    #[serde(default)]
    pub response_code: i32,
    #[serde(default)]
    pub response_time_ms: i32,
    pub location_id: String,
    pub collection_time: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Site24x7Client {
    pub fn new(config: Site24x7Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            accounts_url: config
                .accounts_url
                .unwrap_or_else(|| DEFAULT_ACCOUNTS_URL.to_string()),
            client_id: config.client_id,
            client_secret: config.client_secret,
            refresh_token: config.refresh_token,
            token: RwLock::new(None),
            limiter: RateLimiter::new(CALL_PERIOD),
        })
    }

    /// Fast path: read lock, return the cached token. Slow path: write
    /// lock, re-check (a concurrent caller may have refreshed while we
    /// waited), then refresh.
    async fn access_token(&self) -> Result<String, ProviderError> {
        {
            let guard = self.token.read().await;
            if let Some(cached) = guard.as_ref() {
                if !cached.is_expired(Utc::now()) {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut guard = self.token.write().await;
        if let Some(cached) = guard.as_ref() {
            if !cached.is_expired(Utc::now()) {
                return Ok(cached.access_token.clone());
            }
        }

        let refreshed = self.refresh_access_token().await?;
        let token = refreshed.access_token.clone();
        *guard = Some(refreshed);
        Ok(token)
    }

    async fn refresh_access_token(&self) -> Result<CachedToken, ProviderError> {
        debug!("refreshing site24x7 access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];
        let response = self
            .client
            .post(format!("{}/oauth/v2/token", self.accounts_url))
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Auth {
                provider: PROVIDER_SITE24X7,
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth {
                provider: PROVIDER_SITE24X7,
                detail: format!("token endpoint returned {status}: {body}"),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| ProviderError::Auth {
            provider: PROVIDER_SITE24X7,
            detail: e.to_string(),
        })?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now()
                + chrono::Duration::seconds((token.expires_in - TOKEN_SAFETY_MARGIN_SECS).max(0)),
        })
    }

    async fn authed(&self) -> Result<String, ProviderError> {
        let token = self.access_token().await?;
        Ok(format!("Zoho-oauthtoken {token}"))
    }

    async fn error_for(operation: &'static str, response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        ProviderError::Api {
            provider: PROVIDER_SITE24X7,
            operation,
            status,
            body,
        }
    }
}

/// Site24x7 mixes RFC 3339, zone-suffixed local and epoch-millisecond
/// timestamps across report endpoints. Try each; degrade to now.
pub(crate) fn parse_collection_time(raw: &str) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(millis) = raw.parse::<i64>() {
        if let Some(parsed) = DateTime::from_timestamp_millis(millis) {
            return parsed;
        }
    }
    warn!(timestamp = raw, "unparseable site24x7 collection time, using now");
    Utc::now()
}

/// Filters report entries to the requested region's location and returns
/// the most recent one.
pub(crate) fn latest_for_region(entries: &[LogEntry], region: Region) -> Option<&LogEntry> {
    let location = regions::site24x7_location(region);
    entries
        .iter()
        .filter(|entry| entry.location_id == location)
        .max_by_key(|entry| parse_collection_time(&entry.collection_time))
}

fn to_check_result(entry: &LogEntry) -> CheckResult {
    let available = entry.availability == "1";
    CheckResult {
        status_code: entry.response_code,
        total_time_ms: entry.response_time_ms,
        // Site24x7 has no numeric error code; a failed probe carries its
        // reason text only.
        error_code: i32::from(!available),
        error_description: entry.reason.clone().unwrap_or_default(),
        available,
        checked_at: parse_collection_time(&entry.collection_time),
    }
}

#[async_trait::async_trait]
impl ProviderClient for Site24x7Client {
    fn name(&self) -> &'static str {
        PROVIDER_SITE24X7
    }

    async fn create_monitor(
        &self,
        url: &str,
        display_name: &str,
        interval: CheckInterval,
        submit_regions: &[Region],
    ) -> Result<String, ProviderError> {
        self.limiter.acquire().await;
        let auth = self.authed().await?;

        let locations: Vec<&str> = submit_regions
            .iter()
            .map(|region| regions::site24x7_location(*region))
            .collect();
        let body = serde_json::json!({
            "display_name": display_name,
            "type": "URL",
            "website": url,
            "check_frequency": interval.minutes().to_string(),
            "location_ids": locations,
        });

        let response = self
            .client
            .post(format!("{}/monitors", self.base_url))
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER_SITE24X7,
                operation: "create_monitor",
                source,
            })?;

        if !response.status().is_success() {
            return Err(Self::error_for("create_monitor", response).await);
        }

        let created: ApiEnvelope<CreatedMonitor> =
            response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed {
                    provider: PROVIDER_SITE24X7,
                    operation: "create_monitor",
                    detail: e.to_string(),
                })?;
        Ok(created.data.monitor_id)
    }

    async fn update_monitor_status(
        &self,
        external_id: &str,
        active: bool,
    ) -> Result<(), ProviderError> {
        self.limiter.acquire().await;
        let auth = self.authed().await?;

        let action = if active { "activate" } else { "suspend" };
        let response = self
            .client
            .put(format!(
                "{}/monitors/{}/{}",
                self.base_url, action, external_id
            ))
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER_SITE24X7,
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
        let auth = self.authed().await?;

        let response = self
            .client
            .delete(format!("{}/monitors/{}", self.base_url, external_id))
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER_SITE24X7,
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
        let auth = self.authed().await?;

        let response = self
            .client
            .get(format!(
                "{}/reports/log_reports/{}?limit=25",
                self.base_url, external_id
            ))
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER_SITE24X7,
                operation: "latest_check",
                source,
            })?;

        if !response.status().is_success() {
            return Err(Self::error_for("latest_check", response).await);
        }

        let report: ApiEnvelope<LogReport> =
            response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed {
                    provider: PROVIDER_SITE24X7,
                    operation: "latest_check",
                    detail: e.to_string(),
                })?;

        Ok(latest_for_region(&report.data.report, region).map(to_check_result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(location: &str, time: &str, availability: &str) -> LogEntry {
        LogEntry {
            availability: availability.to_string(),
            response_code: 200,
            response_time_ms: 120,
            location_id: location.to_string(),
            collection_time: time.to_string(),
            reason: None,
        }
    }

    #[test]
    fn token_expiry_honors_the_cached_deadline() {
        let now = Utc.with_ymd_and_hms(2025, 5, 3, 12, 0, 0).unwrap();
        let token = CachedToken {
            access_token: "tok".to_string(),
            expires_at: now + chrono::Duration::seconds(30),
        };
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + chrono::Duration::seconds(30)));
        assert!(token.is_expired(now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn parses_zone_suffixed_and_epoch_timestamps() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 3, 4, 45, 30).unwrap();
        assert_eq!(
            parse_collection_time("2025-05-03T10:15:30+0530"),
            expected
        );
        assert_eq!(
            parse_collection_time(&expected.timestamp_millis().to_string()),
            expected
        );
        assert_eq!(parse_collection_time("2025-05-03T04:45:30Z"), expected);
    }

    #[test]
    fn filters_entries_to_the_requested_location() {
        let entries = vec![
            entry("ap.jp.tokyo", "2025-05-03T12:00:00Z", "1"),
            entry("ap.th.bangkok", "2025-05-03T11:00:00Z", "0"),
        ];
        let picked = latest_for_region(&entries, Region::Th).expect("bangkok entry present");
        assert_eq!(picked.location_id, "ap.th.bangkok");
    }

    #[test]
    fn no_matching_location_is_no_result() {
        let entries = vec![entry("ap.jp.tokyo", "2025-05-03T12:00:00Z", "1")];
        assert!(latest_for_region(&entries, Region::Us).is_none());
    }

    #[test]
    fn availability_maps_from_the_flag_not_the_status() {
        let mut down = entry("na.us.east", "2025-05-03T12:00:00Z", "0");
        down.reason = Some("connection timed out".to_string());
        let result = to_check_result(&down);
        assert!(!result.available);
        assert_eq!(result.error_code, 1);
        assert_eq!(result.error_description, "connection timed out");

        let up = to_check_result(&entry("na.us.east", "2025-05-03T12:00:00Z", "1"));
        assert!(up.available);
        assert_eq!(up.error_code, 0);
    }
}
