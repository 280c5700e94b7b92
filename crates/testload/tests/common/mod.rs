//! Shared fakes and fixtures for testload integration tests
//!
//! `MemoryStore` and `ScriptedWarehouse` stand in for the bucket and the
//! warehouse so pipeline scenarios run without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tempfile::NamedTempFile;
use testload::config::Config;
use testload::storage::ObjectStore;
use testload::warehouse::{JobHandle, JobStatus, LoadRequest, Warehouse};
use testload::{Error, Result};

/// Environment for a run of `acme/widgets` build 42 on `main`
pub fn test_env() -> HashMap<&'static str, String> {
    HashMap::from([
        ("BIGQUERY_PROJECT", "proj".to_string()),
        ("BIGQUERY_DATASET", "ci".to_string()),
        ("BIGQUERY_TABLE", "go_tests".to_string()),
        ("TEST_RESULTS_BUCKET", "results".to_string()),
        ("CIRCLE_REPOSITORY_URL", "acme/widgets".to_string()),
        ("CIRCLE_STAGE", "test".to_string()),
        ("CIRCLE_BRANCH", "main".to_string()),
        ("CIRCLE_BUILD_NUM", "42".to_string()),
        ("CIRCLE_SHA1", "abc123".to_string()),
        ("LOAD_POLL_INTERVAL_SECS", "1".to_string()),
    ])
}

pub fn test_config() -> Config {
    let env = test_env();
    Config::from_lookup(|key| env.get(key).cloned()).expect("test config is valid")
}

/// Write `contents` to a fresh temporary file
pub fn write_input(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create input file");
    file.write_all(contents.as_bytes()).expect("write input file");
    file.flush().expect("flush input file");
    file
}

/// In-memory bucket
#[derive(Default)]
pub struct MemoryStore {
    pub deny: bool,
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Default::default()
        }
    }

    pub fn object(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        "results"
    }

    fn object_uri(&self, key: &str) -> String {
        format!("gs://results/{key}")
    }

    async fn check_access(&self) -> Result<()> {
        if self.deny {
            return Err(Error::storage("bucket results is not accessible: 403 Forbidden"));
        }
        Ok(())
    }

    async fn put_file(&self, key: &str, path: &Path, _content_type: &str) -> Result<()> {
        let data = std::fs::read(path).map_err(|e| Error::storage(e.to_string()))?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }
}

/// Warehouse that replays a fixed list of job statuses
pub struct ScriptedWarehouse {
    pub statuses: Mutex<VecDeque<JobStatus>>,
    pub submitted: Mutex<Vec<LoadRequest>>,
}

impl ScriptedWarehouse {
    pub fn new(statuses: Vec<JobStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(output_rows: u64) -> Self {
        Self::new(vec![JobStatus::succeeded(Some(output_rows))])
    }

    pub fn submissions(&self) -> Vec<LoadRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for ScriptedWarehouse {
    async fn submit_load(&self, request: &LoadRequest) -> Result<JobHandle> {
        self.submitted.lock().unwrap().push(request.clone());
        Ok(JobHandle {
            project_id: "proj".to_string(),
            job_id: "testload_job".to_string(),
            location: None,
        })
    }

    async fn job_status(&self, _job: &JobHandle) -> Result<JobStatus> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| JobStatus::succeeded(None)))
    }
}
