use serde::{Deserialize, Serialize};
use std::fmt;

/// Google Cloud Storage's S3-interoperable XML API.
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Region name accepted by GCS interoperability; AWS endpoints need a real one.
pub const DEFAULT_STORAGE_REGION: &str = "auto";

/// Scheme of the object URI handed to the warehouse.
pub const DEFAULT_URI_SCHEME: &str = "gs";

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static HMAC credentials; when absent the default AWS provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
    pub uri_scheme: String,
}

impl StorageConfig {
    /// GCS interoperability defaults for `bucket`
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(DEFAULT_STORAGE_ENDPOINT.to_string()),
            region: DEFAULT_STORAGE_REGION.to_string(),
            bucket: bucket.into(),
            access_key: None,
            secret_key: None,
            path_style: true,
            uri_scheme: DEFAULT_URI_SCHEME.to_string(),
        }
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// `{scheme}://{bucket}/{key}`
    pub fn object_uri(&self, key: &str) -> String {
        format!("{}://{}/{}", self.uri_scheme, self.bucket, key)
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("path_style", &self.path_style)
            .field("uri_scheme", &self.uri_scheme)
            .finish()
    }
}
