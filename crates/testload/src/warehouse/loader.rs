//! Load job orchestration
//!
//! Submits one load request and polls the warehouse until the job reaches a
//! terminal state.

use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{JobHandle, JobPhase, JobStatus, LoadConfig, LoadRequest, Warehouse};
use crate::error::{Error, Result};

/// Client-side view of a load job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadJobState {
    Submitted,
    Running,
    Succeeded,
    Failed,
}

impl LoadJobState {
    /// Next state given a freshly polled status. Terminal states never change.
    pub fn advance(self, status: &JobStatus) -> Self {
        if self.is_terminal() {
            return self;
        }
        match status.phase {
            JobPhase::Pending => self,
            JobPhase::Running => LoadJobState::Running,
            JobPhase::Done if status.error.is_some() => LoadJobState::Failed,
            JobPhase::Done => LoadJobState::Succeeded,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadJobState::Succeeded | LoadJobState::Failed)
    }
}

/// A load job that completed successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub job_id: String,
    pub output_rows: Option<u64>,
}

pub struct BulkLoader<'a> {
    warehouse: &'a dyn Warehouse,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl<'a> BulkLoader<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, config: &LoadConfig) -> Self {
        Self {
            warehouse,
            poll_interval: config.poll_interval,
            timeout: config.timeout,
        }
    }

    /// Submit `request` and wait for the job to finish.
    #[instrument(skip(self, request), fields(table = %request.destination))]
    pub async fn run(&self, request: &LoadRequest) -> Result<LoadOutcome> {
        let job = self.warehouse.submit_load(request).await?;

        let status = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.wait(&job))
                .await
                .map_err(|_| {
                    Error::wait(
                        &job.job_id,
                        format!("job did not finish within {}s", limit.as_secs()),
                    )
                })??,
            None => self.wait(&job).await?,
        };

        if let Some(message) = status.error {
            return Err(Error::Load {
                job_id: job.job_id,
                message,
            });
        }

        info!(job_id = %job.job_id, output_rows = ?status.output_rows, "Load job succeeded");

        Ok(LoadOutcome {
            job_id: job.job_id,
            output_rows: status.output_rows,
        })
    }

    async fn wait(&self, job: &JobHandle) -> Result<JobStatus> {
        let mut state = LoadJobState::Submitted;

        loop {
            let status = self.warehouse.job_status(job).await?;
            let next = state.advance(&status);

            if next != state {
                debug!(job_id = %job.job_id, from = ?state, to = ?next, "Load job state changed");
                state = next;
            }

            if state.is_terminal() {
                return Ok(status);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
