//! Worker configuration, read once at startup. No hot reload.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::detector::{
    DEFAULT_BATCH_LIMIT, DEFAULT_PROCESSED_MARKER, DEFAULT_THRESHOLD_SECS, DetectionSettings,
};
use crate::notify::HttpNotifierConfig;
use crate::store::ClickHouseConfig;

pub const DEFAULT_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_CLICKHOUSE_URL: &str = "http://localhost:8123";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

const ENV_THRESHOLD_SECS: &str = "TRACEWATCH_THRESHOLD_SECS";
const ENV_INTERVAL_MS: &str = "TRACEWATCH_INTERVAL_MS";
const ENV_BATCH_LIMIT: &str = "TRACEWATCH_BATCH_LIMIT";
const ENV_PROCESSED_MARKER: &str = "TRACEWATCH_PROCESSED_MARKER";
const ENV_API_BASE_URL: &str = "TRACEWATCH_API_BASE_URL";
const ENV_API_KEY: &str = "TRACEWATCH_API_KEY";
const ENV_CLICKHOUSE_URL: &str = "TRACEWATCH_CLICKHOUSE_URL";
const ENV_CLICKHOUSE_DATABASE: &str = "TRACEWATCH_CLICKHOUSE_DATABASE";
const ENV_CLICKHOUSE_USER: &str = "TRACEWATCH_CLICKHOUSE_USER";
const ENV_CLICKHOUSE_PASSWORD: &str = "TRACEWATCH_CLICKHOUSE_PASSWORD";
const ENV_REQUEST_TIMEOUT_MS: &str = "TRACEWATCH_REQUEST_TIMEOUT_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}: {reason}")]
    Parse {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Inactivity window after which a trace counts as concluded.
    pub threshold_secs: u64,
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    pub batch_limit: usize,
    pub processed_marker: String,
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub clickhouse_url: String,
    pub clickhouse_database: Option<String>,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub request_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threshold_secs: DEFAULT_THRESHOLD_SECS,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            batch_limit: DEFAULT_BATCH_LIMIT,
            processed_marker: DEFAULT_PROCESSED_MARKER.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            clickhouse_url: DEFAULT_CLICKHOUSE_URL.to_string(),
            clickhouse_database: None,
            clickhouse_user: None,
            clickhouse_password: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl WorkerConfig {
    /// Read `TRACEWATCH_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take defaults.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let api_base_url = get(ENV_API_BASE_URL).unwrap_or_else(|| {
            warn!("{ENV_API_BASE_URL} not set; using {DEFAULT_API_BASE_URL}");
            defaults.api_base_url.clone()
        });
        let clickhouse_url = get(ENV_CLICKHOUSE_URL).unwrap_or_else(|| {
            warn!("{ENV_CLICKHOUSE_URL} not set; using {DEFAULT_CLICKHOUSE_URL}");
            defaults.clickhouse_url.clone()
        });

        let config = Self {
            threshold_secs: parse_or(&get, ENV_THRESHOLD_SECS, defaults.threshold_secs)?,
            interval: Duration::from_millis(parse_or(
                &get,
                ENV_INTERVAL_MS,
                DEFAULT_INTERVAL_MS,
            )?),
            batch_limit: parse_or(&get, ENV_BATCH_LIMIT, defaults.batch_limit)?,
            processed_marker: get(ENV_PROCESSED_MARKER).unwrap_or(defaults.processed_marker),
            api_base_url,
            api_key: get(ENV_API_KEY),
            clickhouse_url,
            clickhouse_database: get(ENV_CLICKHOUSE_DATABASE),
            clickhouse_user: get(ENV_CLICKHOUSE_USER),
            clickhouse_password: get(ENV_CLICKHOUSE_PASSWORD),
            request_timeout: Duration::from_millis(parse_or(
                &get,
                ENV_REQUEST_TIMEOUT_MS,
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_secs == 0 {
            return Err(ConfigError::Invalid("threshold must be > 0 seconds".into()));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be > 0 ms".into()));
        }
        if self.batch_limit == 0 {
            return Err(ConfigError::Invalid("batch limit must be > 0".into()));
        }
        if !is_valid_marker(&self.processed_marker) {
            return Err(ConfigError::Invalid(format!(
                "processed marker {:?} must match [A-Za-z0-9_.-]+",
                self.processed_marker
            )));
        }
        Ok(())
    }

    pub fn detection_settings(&self) -> DetectionSettings {
        DetectionSettings {
            threshold_secs: self.threshold_secs,
            batch_limit: self.batch_limit,
            processed_marker: self.processed_marker.clone(),
        }
    }

    pub fn clickhouse_config(&self) -> ClickHouseConfig {
        let mut cfg = ClickHouseConfig::new(&self.clickhouse_url).with_timeout(self.request_timeout);
        if let Some(db) = &self.clickhouse_database {
            cfg = cfg.with_database(db);
        }
        if let Some(user) = &self.clickhouse_user {
            cfg = cfg.with_credentials(user, self.clickhouse_password.clone().unwrap_or_default());
        }
        cfg
    }

    pub fn notifier_config(&self) -> HttpNotifierConfig {
        let mut cfg = HttpNotifierConfig::new(&self.api_base_url).with_timeout(self.request_timeout);
        if let Some(key) = &self.api_key {
            cfg = cfg.with_api_key(key);
        }
        cfg
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn is_valid_marker(marker: &str) -> bool {
    !marker.is_empty()
        && marker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
