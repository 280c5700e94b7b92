//! Sequential writer for one staging object
//!
//! Bytes are spooled to a local temporary file while the transcoder runs and
//! uploaded as a single object by [`StageWriter::close`]. The object does not
//! exist in the bucket until `close` returns.

use sha2::{Digest, Sha256};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tempfile::NamedTempFile;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, instrument, warn};

use super::{ObjectStore, NDJSON_CONTENT_TYPE};
use crate::error::{Error, Result};
use crate::record::Provenance;

/// Object key of a staging object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLocation {
    pub key: String,
}

impl StageLocation {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// `{repo}/{branch}/{run}-{stage}-{commit}`
    ///
    /// Identical provenance always maps to the same key.
    pub fn from_provenance(provenance: &Provenance) -> Self {
        Self::new(format!(
            "{}/{}/{}-{}-{}",
            provenance.repo, provenance.branch, provenance.run, provenance.stage, provenance.commit
        ))
    }
}

/// A finalized staging object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedObject {
    pub bucket: String,
    pub key: String,
    pub uri: String,
    pub size: u64,
    /// Hex SHA-256 of the uploaded content
    pub sha256: String,
}

pub struct StageWriter<'a> {
    store: &'a dyn ObjectStore,
    key: String,
    spool: NamedTempFile,
    file: tokio::fs::File,
    hasher: Sha256,
    size: u64,
    closed: bool,
}

impl<'a> StageWriter<'a> {
    /// Open a writer for `location`.
    ///
    /// Checks bucket access first so an unreachable store fails before any
    /// input is consumed.
    #[instrument(skip(store), fields(bucket = store.bucket()))]
    pub async fn open(store: &'a dyn ObjectStore, location: StageLocation) -> Result<Self> {
        store.check_access().await?;

        let spool = NamedTempFile::new()
            .map_err(|e| Error::storage(format!("failed to create spool file: {e}")))?;
        let handle = spool
            .reopen()
            .map_err(|e| Error::storage(format!("failed to open spool file: {e}")))?;

        info!(key = %location.key, "Opened staging object");

        Ok(Self {
            store,
            key: location.key,
            spool,
            file: tokio::fs::File::from_std(handle),
            hasher: Sha256::new(),
            size: 0,
            closed: false,
        })
    }

    /// Bytes written so far
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flush the spool and upload it as the staging object.
    ///
    /// Consumes the writer, so an object is finalized at most once.
    #[instrument(skip(self), fields(key = %self.key, bytes = self.size))]
    pub async fn close(mut self) -> Result<StagedObject> {
        self.closed = true;

        self.file.flush().await.map_err(Error::Write)?;
        self.file.sync_all().await.map_err(Error::Write)?;

        self.store
            .put_file(&self.key, self.spool.path(), NDJSON_CONTENT_TYPE)
            .await?;

        let sha256 = hex::encode(std::mem::take(&mut self.hasher).finalize());

        let staged = StagedObject {
            bucket: self.store.bucket().to_string(),
            key: self.key.clone(),
            uri: self.store.object_uri(&self.key),
            size: self.size,
            sha256,
        };

        info!(uri = %staged.uri, sha256 = %staged.sha256, "Staging object finalized");

        Ok(staged)
    }
}

impl AsyncWrite for StageWriter<'_> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let written = ready!(Pin::new(&mut this.file).poll_write(cx, buf))?;
        this.hasher.update(&buf[..written]);
        this.size += written as u64;
        Poll::Ready(Ok(written))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

impl Drop for StageWriter<'_> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                key = %self.key,
                bytes = self.size,
                "Staging writer dropped without close; object was not uploaded"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        deny: bool,
        reject_upload: bool,
        objects: Mutex<Vec<(String, Vec<u8>, String)>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        fn bucket(&self) -> &str {
            "bucket"
        }

        fn object_uri(&self, key: &str) -> String {
            format!("gs://bucket/{key}")
        }

        async fn check_access(&self) -> Result<()> {
            if self.deny {
                return Err(Error::storage("403 Forbidden"));
            }
            Ok(())
        }

        async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
            if self.reject_upload {
                return Err(Error::storage("503 Service Unavailable"));
            }
            let data = std::fs::read(path).unwrap();
            self.objects
                .lock()
                .unwrap()
                .push((key.to_string(), data, content_type.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_location_from_provenance() {
        let provenance = Provenance::new(
            "https://github.com/acme/widgets",
            "main",
            "abc123",
            "42",
            "test",
        );
        let location = StageLocation::from_provenance(&provenance);
        assert_eq!(
            location.key,
            "https://github.com/acme/widgets/main/42-test-abc123"
        );
        assert_eq!(StageLocation::from_provenance(&provenance), location);
    }

    #[tokio::test]
    async fn test_close_uploads_spooled_bytes() {
        let store = RecordingStore::default();
        let mut writer = StageWriter::open(&store, StageLocation::new("r/main/1-unit-c"))
            .await
            .unwrap();

        writer.write_all(b"hello world").await.unwrap();
        assert_eq!(writer.size(), 11);

        let staged = writer.close().await.unwrap();

        assert_eq!(staged.uri, "gs://bucket/r/main/1-unit-c");
        assert_eq!(staged.size, 11);
        assert_eq!(
            staged.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );

        let objects = store.objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].0, "r/main/1-unit-c");
        assert_eq!(objects[0].1, b"hello world");
        assert_eq!(objects[0].2, NDJSON_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_close_empty_object() {
        let store = RecordingStore::default();
        let writer = StageWriter::open(&store, StageLocation::new("empty"))
            .await
            .unwrap();

        let staged = writer.close().await.unwrap();
        assert_eq!(staged.size, 0);
        assert_eq!(store.objects.lock().unwrap()[0].1, Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_open_fails_when_bucket_denied() {
        let store = RecordingStore {
            deny: true,
            ..Default::default()
        };
        let err = StageWriter::open(&store, StageLocation::new("k"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.stage(), "storage");
    }

    #[tokio::test]
    async fn test_close_propagates_upload_failure() {
        let store = RecordingStore {
            reject_upload: true,
            ..Default::default()
        };
        let mut writer = StageWriter::open(&store, StageLocation::new("k"))
            .await
            .unwrap();
        writer.write_all(b"{}\n").await.unwrap();

        let err = writer.close().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
