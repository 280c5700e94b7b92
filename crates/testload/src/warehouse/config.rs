use std::fmt;
use std::time::Duration;

use super::TableRef;

/// BigQuery REST endpoint.
pub const DEFAULT_BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com";

/// Timeout for a single REST call in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default delay between job status polls in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

#[derive(Clone)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub api_url: String,
    /// OAuth bearer token; omitted from requests when absent
    pub access_token: Option<String>,
    /// Job location (e.g. "US", "europe-west2")
    pub location: Option<String>,
    pub request_timeout: Duration,
}

impl WarehouseConfig {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
            api_url: DEFAULT_BIGQUERY_API_URL.to_string(),
            access_token: None,
            location: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset_id, &self.table_id)
    }
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("project_id", &self.project_id)
            .field("dataset_id", &self.dataset_id)
            .field("table_id", &self.table_id)
            .field("api_url", &self.api_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("location", &self.location)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// How the load job is awaited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadConfig {
    pub poll_interval: Duration,
    /// `None` waits for as long as the job runs
    pub timeout: Option<Duration>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: None,
        }
    }
}
