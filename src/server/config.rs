use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

use crate::providers::site24x7::Site24x7Config;
use crate::providers::uptrends::UptrendsConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    /// 64 hex characters; used for channel payload encryption at rest.
    pub channel_encryption_key: String,
    pub reconcile_interval_secs: u64,
    pub uptrends: Option<UptrendsSection>,
    pub site24x7: Option<Site24x7Section>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UptrendsSection {
    pub api_user: String,
    pub api_password: String,
    pub base_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Site24x7Section {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub base_url: Option<String>,
    pub accounts_url: Option<String>,
}

impl From<UptrendsSection> for UptrendsConfig {
    fn from(section: UptrendsSection) -> Self {
        UptrendsConfig {
            api_user: section.api_user,
            api_password: section.api_password,
            base_url: section.base_url,
        }
    }
}

impl From<Site24x7Section> for Site24x7Config {
    fn from(section: Site24x7Section) -> Self {
        Site24x7Config {
            client_id: section.client_id,
            client_secret: section.client_secret,
            refresh_token: section.refresh_token,
            base_url: section.base_url,
            accounts_url: section.accounts_url,
        }
    }
}

// Partial config for layering: file first, environment on top.
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    channel_encryption_key: Option<String>,
    reconcile_interval_secs: Option<u64>,
    uptrends: Option<UptrendsSection>,
    site24x7: Option<Site24x7Section>,
}

const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        let mut partial: PartialServerConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            let contents = fs::read_to_string(path)
                .map_err(|e| format!("failed to read config file at {path:?}: {e}"))?;
            toml::from_str(&contents)
                .map_err(|e| format!("failed to parse config file at {path:?}: {e}"))?
        } else {
            PartialServerConfig::default()
        };

        // Environment overrides for the scalar keys.
        if let Ok(value) = env::var("DATABASE_URL") {
            partial.database_url = Some(value);
        }
        if let Ok(value) = env::var("CHANNEL_ENCRYPTION_KEY") {
            partial.channel_encryption_key = Some(value);
        }
        if let Ok(value) = env::var("RECONCILE_INTERVAL_SECS") {
            let parsed = value
                .parse::<u64>()
                .map_err(|_| "RECONCILE_INTERVAL_SECS must be an integer".to_string())?;
            partial.reconcile_interval_secs = Some(parsed);
        }

        Ok(ServerConfig {
            database_url: partial
                .database_url
                .ok_or_else(|| "DATABASE_URL must be set".to_string())?,
            channel_encryption_key: partial
                .channel_encryption_key
                .ok_or_else(|| "CHANNEL_ENCRYPTION_KEY must be set".to_string())?,
            reconcile_interval_secs: partial
                .reconcile_interval_secs
                .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
            uptrends: partial.uptrends,
            site24x7: partial.site24x7,
        })
    }
}
