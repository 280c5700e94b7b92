//! BigQuery jobs REST client
//!
//! Submits load jobs with `jobs.insert` and reads their state with `jobs.get`.
//! Job ids are generated client side so a submission can be identified in logs
//! before the server answers.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    JobHandle, JobPhase, JobStatus, LoadRequest, TableRef, Warehouse, WarehouseConfig,
};
use crate::error::{Error, Result};

/// Prefix of generated job ids.
pub const JOB_ID_PREFIX: &str = "testload_";

#[derive(Debug, Clone)]
pub struct BigQuery {
    client: Client,
    base_url: String,
    project_id: String,
    access_token: Option<String>,
    location: Option<String>,
}

impl BigQuery {
    pub fn new(config: &WarehouseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            access_token: config.access_token.clone(),
            location: config.location.clone(),
        })
    }

    fn jobs_url(&self, project_id: &str) -> String {
        format!("{}/bigquery/v2/projects/{}/jobs", self.base_url, project_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn new_job_id() -> String {
    format!("{}{}", JOB_ID_PREFIX, Uuid::new_v4().simple())
}

#[async_trait]
impl Warehouse for BigQuery {
    #[instrument(skip(self, request), fields(table = %request.destination, uri = %request.source_uri))]
    async fn submit_load(&self, request: &LoadRequest) -> Result<JobHandle> {
        let job_id = new_job_id();
        let body = InsertJobRequest::load(&self.project_id, &job_id, self.location.as_deref(), request);

        debug!(job_id = %job_id, "Submitting load job");

        let response = self
            .authorize(self.client.post(self.jobs_url(&self.project_id)))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::submission(format!("request failed: {e}")))?;

        let response = check_status(response).await.map_err(Error::submission)?;

        let job: JobResource = response
            .json()
            .await
            .map_err(|e| Error::submission(format!("invalid response: {e}")))?;

        let reference = job.job_reference.unwrap_or_else(|| JobReference {
            project_id: self.project_id.clone(),
            job_id: job_id.clone(),
            location: self.location.clone(),
        });

        info!(job_id = %reference.job_id, "Load job submitted");

        Ok(JobHandle {
            project_id: reference.project_id,
            job_id: reference.job_id,
            location: reference.location.or_else(|| self.location.clone()),
        })
    }

    #[instrument(skip(self), fields(job_id = %job.job_id))]
    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus> {
        let url = format!("{}/{}", self.jobs_url(&job.project_id), job.job_id);

        let mut request = self.authorize(self.client.get(url));
        if let Some(location) = &job.location {
            request = request.query(&[("location", location)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::wait(&job.job_id, format!("request failed: {e}")))?;

        let response = check_status(response)
            .await
            .map_err(|message| Error::wait(&job.job_id, message))?;

        let resource: JobResource = response
            .json()
            .await
            .map_err(|e| Error::wait(&job.job_id, format!("invalid response: {e}")))?;

        resource
            .into_status()
            .map_err(|message| Error::wait(&job.job_id, message))
    }
}

/// Pass successful responses through; turn anything else into a message
async fn check_status(response: Response) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .ok()
        .and_then(|body| body.error.message)
        .unwrap_or(text);

    Err(format!("{status}: {message}"))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertJobRequest<'a> {
    job_reference: JobReferenceRef<'a>,
    configuration: JobConfiguration<'a>,
}

impl<'a> InsertJobRequest<'a> {
    fn load(
        project_id: &'a str,
        job_id: &'a str,
        location: Option<&'a str>,
        request: &'a LoadRequest,
    ) -> Self {
        Self {
            job_reference: JobReferenceRef {
                project_id,
                job_id,
                location,
            },
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    source_uris: vec![&request.source_uri],
                    source_format: request.source_format.as_str(),
                    autodetect: request.autodetect,
                    write_disposition: request.write_disposition.as_str(),
                    destination_table: TableReference::from(&request.destination),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobReferenceRef<'a> {
    project_id: &'a str,
    job_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    load: LoadConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration<'a> {
    source_uris: Vec<&'a str>,
    source_format: &'static str,
    autodetect: bool,
    write_disposition: &'static str,
    destination_table: TableReference<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
    table_id: &'a str,
}

impl<'a> From<&'a TableRef> for TableReference<'a> {
    fn from(table: &'a TableRef) -> Self {
        Self {
            project_id: &table.project_id,
            dataset_id: &table.dataset_id,
            table_id: &table.table_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: Option<JobReference>,
    #[serde(default)]
    status: Option<JobStatusResource>,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

impl JobResource {
    fn into_status(self) -> std::result::Result<JobStatus, String> {
        let status = self.status.unwrap_or_default();
        let phase = match status.state.as_deref() {
            Some("PENDING") => JobPhase::Pending,
            Some("RUNNING") => JobPhase::Running,
            Some("DONE") => JobPhase::Done,
            Some(other) => return Err(format!("unknown job state {other:?}")),
            None => return Err("job status has no state".to_string()),
        };

        let error = status.error_result.map(|e| match (e.reason, e.message) {
            (Some(reason), Some(message)) => format!("{reason}: {message}"),
            (None, Some(message)) => message,
            (Some(reason), None) => reason,
            (None, None) => "unknown error".to_string(),
        });

        let output_rows = self
            .statistics
            .and_then(|s| s.load)
            .and_then(|l| l.output_rows)
            .and_then(|rows| rows.parse().ok());

        Ok(JobStatus {
            phase,
            error,
            output_rows,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResource {
    state: Option<String>,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

/// BigQuery encodes int64 statistics as strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    output_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorProto,
}
