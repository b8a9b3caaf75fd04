//! Layered configuration for import runs
//!
//! Sources, highest priority first:
//! 1. Environment variables (`REGISTRY_SYNC_*`, `__` separates nested keys)
//! 2. A TOML file (`--config PATH`, or `registry-sync.toml` in the working directory)
//! 3. Built-in defaults
//!
//! `REGISTRY_SYNC_SAFETY__MAX_FRACTION=0.5` maps to `safety.max_fraction`.

use crate::entity::DataSourceId;
use crate::fetch::FetchSettings;
use crate::reconcile::SafetyThreshold;
use chrono::{DateTime, TimeDelta, Utc};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const LOCAL_CONFIG_FILE: &str = "registry-sync.toml";
const ENV_PREFIX: &str = "REGISTRY_SYNC_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Settings of one import run against one remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote API, without the `/v1/` suffix
    pub api_url: String,
    /// Local data source that owns everything this run imports
    pub data_source: String,
    /// Languages flattened by the multilingual mapper; the first is the default
    pub languages: Vec<String>,
    /// Extra query parameters appended to the event listing
    pub event_query_params: BTreeMap<String, String>,
    pub max_retries: u32,
    pub max_pages: usize,
    pub retry_delay_ms: u64,
    pub page_delay_ms: u64,
    /// Request timeout for a single HTTP call
    pub timeout_secs: u64,
    /// Events that ended more than this many days ago are kept even when absent remotely
    pub history_days: i64,
    pub safety: SafetyThreshold,
    /// SQLite database path; defaults to the platform data directory
    pub database: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.espoo.fi/events/linkedevents".to_string(),
            data_source: "espoo".to_string(),
            languages: vec!["fi".to_string(), "sv".to_string(), "en".to_string()],
            event_query_params: BTreeMap::new(),
            max_retries: 5,
            max_pages: 100,
            retry_delay_ms: 5_000,
            page_delay_ms: 1_000,
            timeout_secs: 30,
            history_days: 31,
            safety: SafetyThreshold::default(),
            database: None,
        }
    }
}

impl SyncConfig {
    /// Load from defaults, `registry-sync.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load using an explicit TOML file instead of the working-directory one.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the provider chain.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match path {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                let local = PathBuf::from(LOCAL_CONFIG_FILE);
                if local.exists() {
                    figment = figment.merge(Toml::file(local));
                }
            }
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.data_source.trim().is_empty() {
            return Err(invalid("data_source", "must not be empty"));
        }
        if self.languages.is_empty() {
            return Err(invalid("languages", "at least one language is required"));
        }
        if self.history_days < 0 {
            return Err(invalid("history_days", "must not be negative"));
        }
        self.history_cutoff()?;
        if let Some(fraction) = self.safety.max_fraction {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(invalid("safety.max_fraction", "must be between 0 and 1"));
            }
        }
        Ok(())
    }

    /// Start of the history window: events ending before it are kept.
    pub fn history_cutoff(&self) -> Result<DateTime<Utc>, ConfigError> {
        TimeDelta::try_days(self.history_days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| invalid("history_days", "window reaches past the representable date range"))
    }

    pub fn data_source_id(&self) -> DataSourceId {
        DataSourceId::from_string(self.data_source.clone())
    }

    /// Collection URL of a remote resource: `{api_url}/v1/{resource}/`
    pub fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/v1/{}/",
            self.api_url.trim_end_matches('/'),
            resource.trim_matches('/')
        )
    }

    /// URL of one record of a remote resource
    pub fn record_url(&self, resource: &str, id: &str) -> String {
        format!("{}{}/", self.resource_url(resource), id)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            max_retries: self.max_retries,
            max_pages: self.max_pages,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            page_delay: Duration::from_millis(self.page_delay_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured database path, or `<data dir>/registry-sync/registry.db`
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("registry-sync")
                .join("registry.db")
        })
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn load(path: Option<&Path>) -> figment::Result<SyncConfig> {
        SyncConfig::load_from(path).map_err(|e| e.to_string().into())
    }

    #[test]
    fn defaults_extract_without_files() {
        Jail::expect_with(|_jail| {
            let config = load(None)?;
            assert_eq!(config, SyncConfig::default());
            assert_eq!(config.safety.max_fraction, Some(0.2));
            assert_eq!(config.safety.max_deletions, None);
            Ok(())
        });
    }

    #[test]
    fn toml_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "registry-sync.toml",
                r#"
                    api_url = "http://localhost/"
                    data_source = "turku"
                    languages = ["fi", "en"]

                    [event_query_params]
                    test = "1"

                    [safety]
                    max_deletions = 50
                "#,
            )?;
            jail.set_env("REGISTRY_SYNC_DATA_SOURCE", "vantaa");
            jail.set_env("REGISTRY_SYNC_SAFETY__MAX_FRACTION", "0.5");

            let config = load(None)?;
            assert_eq!(config.api_url, "http://localhost/");
            assert_eq!(config.data_source, "vantaa");
            assert_eq!(config.languages, vec!["fi", "en"]);
            assert_eq!(config.event_query_params.get("test").map(String::as_str), Some("1"));
            assert_eq!(config.safety.max_deletions, Some(50));
            assert_eq!(config.safety.max_fraction, Some(0.5));
            Ok(())
        });
    }

    #[test]
    fn explicit_path_replaces_local_file() {
        Jail::expect_with(|jail| {
            jail.create_file("registry-sync.toml", r#"data_source = "local""#)?;
            jail.create_file("other.toml", r#"data_source = "other""#)?;

            let config = load(Some(Path::new("other.toml")))?;
            assert_eq!(config.data_source, "other");
            Ok(())
        });
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        Jail::expect_with(|jail| {
            jail.set_env("REGISTRY_SYNC_SAFETY__MAX_FRACTION", "1.5");
            let err = SyncConfig::load().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "safety.max_fraction"));
            Ok(())
        });
    }

    #[test]
    fn rejects_history_window_beyond_date_range() {
        Jail::expect_with(|jail| {
            jail.set_env("REGISTRY_SYNC_HISTORY_DAYS", "100000000");
            let err = SyncConfig::load().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "history_days"));

            jail.set_env("REGISTRY_SYNC_HISTORY_DAYS", "365");
            let config = load(None)?;
            let window = Utc::now() - config.history_cutoff().map_err(|e| e.to_string())?;
            assert_eq!(window.num_days(), 365);
            Ok(())
        });
    }

    #[test]
    fn resource_urls_normalize_slashes() {
        let mut config = SyncConfig::default();
        config.api_url = "http://localhost/".to_string();
        assert_eq!(config.resource_url("event"), "http://localhost/v1/event/");
        assert_eq!(
            config.record_url("place", "espoo:place1"),
            "http://localhost/v1/place/espoo:place1/"
        );

        config.api_url = "http://localhost/api".to_string();
        assert_eq!(config.resource_url("/organization/"), "http://localhost/api/v1/organization/");
    }

    #[test]
    fn fetch_settings_from_millis() {
        let config = SyncConfig {
            retry_delay_ms: 0,
            page_delay_ms: 250,
            ..Default::default()
        };
        let settings = config.fetch_settings();
        assert_eq!(settings.retry_delay, Duration::ZERO);
        assert_eq!(settings.page_delay, Duration::from_millis(250));
        assert_eq!(settings.max_retries, 5);
    }

    #[test]
    fn explicit_database_path_wins() {
        let config = SyncConfig {
            database: Some(PathBuf::from("/tmp/x.db")),
            ..Default::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x.db"));
        assert!(SyncConfig::default().database_path().ends_with("registry-sync/registry.db"));
    }
}
