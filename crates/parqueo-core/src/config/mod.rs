//! Client configuration.
//!
//! Loaded from a JSON file, then overridden from `PARQUEO_*` environment
//! variables. Only public endpoints, the anon key, and the signed-in user's
//! session token belong here.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::RemoteId;
use crate::remote::{SupabaseSettings, MEDIA_BUCKET, RECORDS_TABLE, UNITS_TABLE};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_SUPABASE_URL: &str = "PARQUEO_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "PARQUEO_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "PARQUEO_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "PARQUEO_USER_ID";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 60;
const DEFAULT_LOCK_STALE_AFTER_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParqueoConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    /// Bearer token of the signed-in user
    #[serde(default)]
    pub access_token: Option<String>,
    /// Submitting user recorded on new records
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_records_table")]
    pub records_table: String,
    #[serde(default = "default_units_table")]
    pub units_table: String,
    #[serde(default = "default_media_bucket")]
    pub media_bucket: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timer drain while online; 0 disables it
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
    #[serde(default = "default_lock_stale_after_secs")]
    pub lock_stale_after_secs: u64,
}

impl Default for ParqueoConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            access_token: None,
            user_id: None,
            records_table: default_records_table(),
            units_table: default_units_table(),
            media_bucket: default_media_bucket(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            drain_interval_secs: DEFAULT_DRAIN_INTERVAL_SECS,
            lock_stale_after_secs: DEFAULT_LOCK_STALE_AFTER_SECS,
        }
    }
}

impl ParqueoConfig {
    /// Read a config file; a missing file yields the defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!("failed to parse {}: {error}", path.display()))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Apply `PARQUEO_*` overrides from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |target: &mut Option<String>, key: &str| {
            if let Some(value) = normalize_text_option(lookup(key)) {
                *target = Some(value);
            }
        };
        set(&mut self.supabase_url, ENV_SUPABASE_URL);
        set(&mut self.supabase_anon_key, ENV_SUPABASE_ANON_KEY);
        set(&mut self.access_token, ENV_ACCESS_TOKEN);
        set(&mut self.user_id, ENV_USER_ID);
        self.normalize();
        self
    }

    pub fn normalize(&mut self) {
        self.supabase_url = normalize_text_option(self.supabase_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key.take());
        self.access_token = normalize_text_option(self.access_token.take());
        self.user_id = normalize_text_option(self.user_id.take());
        normalize_name(&mut self.records_table, RECORDS_TABLE);
        normalize_name(&mut self.units_table, UNITS_TABLE);
        normalize_name(&mut self.media_bucket, MEDIA_BUCKET);
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.supabase_url {
            if !is_http_url(url) {
                return Err(Error::Config(
                    "supabase_url must include http:// or https://".to_string(),
                ));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Remote store settings; fails when the endpoint or key is missing
    pub fn supabase_settings(&self) -> Result<SupabaseSettings> {
        self.validate()?;
        let (Some(url), Some(anon_key)) = (&self.supabase_url, &self.supabase_anon_key) else {
            return Err(Error::Config(format!(
                "Supabase is not configured. Set supabase_url and supabase_anon_key or {ENV_SUPABASE_URL} and {ENV_SUPABASE_ANON_KEY}."
            )));
        };

        let mut settings = SupabaseSettings::new(url.clone(), anon_key.clone());
        settings.access_token.clone_from(&self.access_token);
        settings.records_table.clone_from(&self.records_table);
        settings.units_table.clone_from(&self.units_table);
        settings.media_bucket.clone_from(&self.media_bucket);
        settings.timeout = Duration::from_secs(self.request_timeout_secs);
        Ok(settings)
    }

    pub fn user_id(&self) -> Option<RemoteId> {
        self.user_id.as_deref().and_then(|id| id.parse().ok())
    }

    pub fn drain_interval(&self) -> Option<Duration> {
        (self.drain_interval_secs > 0).then(|| Duration::from_secs(self.drain_interval_secs))
    }

    pub const fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }
}

fn normalize_name(value: &mut String, default: &str) {
    let trimmed = value.trim();
    *value = if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    };
}

fn default_records_table() -> String {
    RECORDS_TABLE.to_string()
}

fn default_units_table() -> String {
    UNITS_TABLE.to_string()
}

fn default_media_bucket() -> String {
    MEDIA_BUCKET.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_drain_interval_secs() -> u64 {
    DEFAULT_DRAIN_INTERVAL_SECS
}

const fn default_lock_stale_after_secs() -> u64 {
    DEFAULT_LOCK_STALE_AFTER_SECS
}
