//! Configuration management
//!
//! Everything is read from the environment (optionally seeded from `.env`)
//! once at startup and passed down by reference.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::record::Provenance;
use crate::storage::config::{DEFAULT_STORAGE_ENDPOINT, DEFAULT_STORAGE_REGION, DEFAULT_URI_SCHEME};
use crate::storage::StorageConfig;
use crate::warehouse::config::{DEFAULT_BIGQUERY_API_URL, DEFAULT_POLL_INTERVAL_SECS};
use crate::warehouse::{LoadConfig, WarehouseConfig};

// ============================================================================
// Environment keys
// ============================================================================

pub const ENV_BIGQUERY_PROJECT: &str = "BIGQUERY_PROJECT";
pub const ENV_BIGQUERY_DATASET: &str = "BIGQUERY_DATASET";
pub const ENV_BIGQUERY_TABLE: &str = "BIGQUERY_TABLE";
pub const ENV_TEST_RESULTS_BUCKET: &str = "TEST_RESULTS_BUCKET";
pub const ENV_REPOSITORY_URL: &str = "CIRCLE_REPOSITORY_URL";
pub const ENV_STAGE: &str = "CIRCLE_STAGE";
pub const ENV_BRANCH: &str = "CIRCLE_BRANCH";
pub const ENV_BUILD_NUM: &str = "CIRCLE_BUILD_NUM";
pub const ENV_COMMIT: &str = "CIRCLE_SHA1";

/// Settings without which the run cannot start, in reporting order.
pub const REQUIRED_KEYS: [&str; 9] = [
    ENV_BIGQUERY_PROJECT,
    ENV_BIGQUERY_DATASET,
    ENV_BIGQUERY_TABLE,
    ENV_TEST_RESULTS_BUCKET,
    ENV_REPOSITORY_URL,
    ENV_STAGE,
    ENV_BRANCH,
    ENV_BUILD_NUM,
    ENV_COMMIT,
];

pub const ENV_BIGQUERY_API_URL: &str = "BIGQUERY_API_URL";
pub const ENV_BIGQUERY_ACCESS_TOKEN: &str = "BIGQUERY_ACCESS_TOKEN";
pub const ENV_BIGQUERY_LOCATION: &str = "BIGQUERY_LOCATION";
pub const ENV_LOAD_POLL_INTERVAL_SECS: &str = "LOAD_POLL_INTERVAL_SECS";
pub const ENV_LOAD_TIMEOUT_SECS: &str = "LOAD_TIMEOUT_SECS";
pub const ENV_STORAGE_ENDPOINT: &str = "STORAGE_ENDPOINT";
pub const ENV_STORAGE_REGION: &str = "STORAGE_REGION";
pub const ENV_STORAGE_ACCESS_KEY: &str = "STORAGE_ACCESS_KEY";
pub const ENV_STORAGE_SECRET_KEY: &str = "STORAGE_SECRET_KEY";
pub const ENV_STORAGE_PATH_STYLE: &str = "STORAGE_PATH_STYLE";
pub const ENV_STORAGE_URI_SCHEME: &str = "STORAGE_URI_SCHEME";

/// Run configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub warehouse: WarehouseConfig,
    pub storage: StorageConfig,
    pub provenance: Provenance,
    pub load: LoadConfig,
}

impl Config {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }
        let required = |key: &str| get(key).unwrap_or_default();

        let warehouse = WarehouseConfig {
            api_url: get(ENV_BIGQUERY_API_URL)
                .unwrap_or_else(|| DEFAULT_BIGQUERY_API_URL.to_string()),
            access_token: get(ENV_BIGQUERY_ACCESS_TOKEN),
            location: get(ENV_BIGQUERY_LOCATION),
            ..WarehouseConfig::new(
                required(ENV_BIGQUERY_PROJECT),
                required(ENV_BIGQUERY_DATASET),
                required(ENV_BIGQUERY_TABLE),
            )
        };

        let storage = StorageConfig {
            endpoint: Some(
                get(ENV_STORAGE_ENDPOINT).unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.to_string()),
            ),
            region: get(ENV_STORAGE_REGION).unwrap_or_else(|| DEFAULT_STORAGE_REGION.to_string()),
            bucket: required(ENV_TEST_RESULTS_BUCKET),
            access_key: get(ENV_STORAGE_ACCESS_KEY),
            secret_key: get(ENV_STORAGE_SECRET_KEY),
            path_style: parse(ENV_STORAGE_PATH_STYLE, get(ENV_STORAGE_PATH_STYLE))?.unwrap_or(true),
            uri_scheme: get(ENV_STORAGE_URI_SCHEME)
                .unwrap_or_else(|| DEFAULT_URI_SCHEME.to_string()),
        };

        let provenance = Provenance::new(
            required(ENV_REPOSITORY_URL),
            required(ENV_BRANCH),
            required(ENV_COMMIT),
            required(ENV_BUILD_NUM),
            required(ENV_STAGE),
        );

        let poll_secs: u64 = parse(ENV_LOAD_POLL_INTERVAL_SECS, get(ENV_LOAD_POLL_INTERVAL_SECS))?
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        let timeout_secs: Option<u64> =
            parse(ENV_LOAD_TIMEOUT_SECS, get(ENV_LOAD_TIMEOUT_SECS))?;

        let load = LoadConfig {
            poll_interval: Duration::from_secs(poll_secs),
            timeout: timeout_secs.map(Duration::from_secs),
        };

        let config = Config {
            warehouse,
            storage,
            provenance,
            load,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.load.poll_interval.is_zero() {
            return Err(Error::config(format!(
                "{ENV_LOAD_POLL_INTERVAL_SECS} must be greater than 0"
            )));
        }

        if self.load.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config(format!(
                "{ENV_LOAD_TIMEOUT_SECS} must be greater than 0"
            )));
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(Error::config(format!(
                "{ENV_STORAGE_ACCESS_KEY} and {ENV_STORAGE_SECRET_KEY} must be set together"
            )));
        }

        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::config(format!("{key} has invalid value {raw:?}")))
        })
        .transpose()
}
