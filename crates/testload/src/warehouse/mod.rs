//! Warehouse bulk loading
//!
//! A [`Warehouse`] accepts a [`LoadRequest`] and exposes the resulting job's
//! status; [`BulkLoader`] drives one job from submission to a terminal state.

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;

pub mod bigquery;
pub mod config;
pub mod loader;

pub use bigquery::BigQuery;
pub use config::{LoadConfig, WarehouseConfig};
pub use loader::{BulkLoader, LoadJobState, LoadOutcome};

/// Fully qualified destination table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    NewlineDelimitedJson,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::NewlineDelimitedJson => "NEWLINE_DELIMITED_JSON",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Add rows to whatever the table already holds
    Append,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::Append => "WRITE_APPEND",
        }
    }
}

/// Bulk load of one staged object into one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub source_uri: String,
    pub destination: TableRef,
    pub source_format: SourceFormat,
    /// Infer the schema from the data
    pub autodetect: bool,
    pub write_disposition: WriteDisposition,
}

impl LoadRequest {
    /// NDJSON, autodetected schema, append-only
    pub fn append_ndjson(source_uri: impl Into<String>, destination: TableRef) -> Self {
        Self {
            source_uri: source_uri.into(),
            destination,
            source_format: SourceFormat::NewlineDelimitedJson,
            autodetect: true,
            write_disposition: WriteDisposition::Append,
        }
    }
}

/// Identifies a submitted load job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub project_id: String,
    pub job_id: String,
    pub location: Option<String>,
}

/// Remote job lifecycle as reported by the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Running,
    Done,
}

/// Snapshot of a job's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub phase: JobPhase,
    /// Set when a `Done` job failed
    pub error: Option<String>,
    pub output_rows: Option<u64>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            phase: JobPhase::Pending,
            error: None,
            output_rows: None,
        }
    }

    pub fn running() -> Self {
        Self {
            phase: JobPhase::Running,
            ..Self::pending()
        }
    }

    pub fn succeeded(output_rows: Option<u64>) -> Self {
        Self {
            phase: JobPhase::Done,
            error: None,
            output_rows,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            phase: JobPhase::Done,
            error: Some(message.into()),
            output_rows: None,
        }
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Submit a load job; fails with [`crate::Error::Submission`] if not accepted
    async fn submit_load(&self, request: &LoadRequest) -> Result<JobHandle>;

    /// Fetch the current status; fails with [`crate::Error::Wait`]
    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus>;
}
