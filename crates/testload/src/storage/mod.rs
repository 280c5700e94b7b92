//! Staging object storage
//!
//! The enriched stream is staged in an S3-compatible bucket (GCS through its
//! interoperability endpoint in production, MinIO or wiremock in tests) before
//! the warehouse loads it.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

pub mod config;
pub mod writer;

pub use config::StorageConfig;
pub use writer::{StageLocation, StageWriter, StagedObject};

/// Content type of staged NDJSON objects.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Minimal object store surface the stage writer needs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket objects are written to
    fn bucket(&self) -> &str;

    /// URI the warehouse uses to address `key`
    fn object_uri(&self, key: &str) -> String;

    /// Fail with [`Error::Storage`] when the bucket is unreachable or denied
    async fn check_access(&self) -> Result<()>;

    /// Upload the file at `path` as object `key`
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    config: StorageConfig,
}

impl Storage {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        if config.bucket.trim().is_empty() {
            return Err(Error::storage("bucket name is empty"));
        }

        let mut s3_config_builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "testload-storage");
                aws_sdk_s3::Config::builder().credentials_provider(credentials)
            },
            _ => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        // GCS interoperability rejects the SDK's default trailing checksums
        s3_config_builder = s3_config_builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Ok(Self { client, config })
    }
}

#[async_trait]
impl ObjectStore for Storage {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn object_uri(&self, key: &str) -> String {
        self.config.object_uri(key)
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn check_access(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|e| {
                Error::storage(format!(
                    "bucket {} is not accessible: {}",
                    self.config.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!("Bucket is accessible");
        Ok(())
    }

    #[instrument(skip(self, path))]
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(path).await.map_err(|e| {
            Error::storage(format!("failed to read spool file {}: {}", path.display(), e))
        })?;

        debug!("Uploading to s3://{}/{}", self.config.bucket, key);

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                Error::storage(format!(
                    "failed to upload {}: {}",
                    self.config.object_uri(key),
                    DisplayErrorContext(&e)
                ))
            })?;

        info!("Successfully uploaded {}", self.config.object_uri(key));

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_bucket_is_rejected() {
        let config = StorageConfig::new("  ").with_credentials("a", "b");
        let err = Storage::new(config).await.err().unwrap();
        assert_eq!(err.stage(), "storage");
    }

    #[tokio::test]
    async fn test_object_uri_uses_configured_scheme() {
        let config = StorageConfig::new("ci-results").with_credentials("a", "b");
        let storage = Storage::new(config).await.unwrap();

        assert_eq!(storage.bucket(), "ci-results");
        assert_eq!(
            storage.object_uri("repo/main/7-unit-deadbeef"),
            "gs://ci-results/repo/main/7-unit-deadbeef"
        );
    }
}
