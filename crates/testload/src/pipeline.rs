//! End-to-end run: transcode → stage → load
//!
//! The staging object is always finalized once opened, even when transcoding
//! fails part way. A load is only submitted after a clean transcode.

use std::path::Path;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::{ObjectStore, StageLocation, StageWriter, StagedObject};
use crate::transcode::{transcode, TranscodeStats};
use crate::warehouse::{BulkLoader, LoadOutcome, LoadRequest, Warehouse};

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub stats: TranscodeStats,
    pub staged: StagedObject,
    pub load: LoadOutcome,
    pub duration_seconds: f64,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    store: &'a dyn ObjectStore,
    warehouse: &'a dyn Warehouse,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a dyn ObjectStore,
        warehouse: &'a dyn Warehouse,
    ) -> Self {
        Self {
            config,
            store,
            warehouse,
        }
    }

    #[instrument(skip(self), fields(input = %input.display()))]
    pub async fn run(&self, input: &Path) -> Result<PipelineResult> {
        let start_time = Instant::now();

        let file = File::open(input)
            .await
            .map_err(|e| Error::input(format!("failed to open {}", input.display()), e))?;

        let location = StageLocation::from_provenance(&self.config.provenance);
        let mut writer = StageWriter::open(self.store, location).await?;

        info!("Uploading test data...");
        let transcoded = transcode(BufReader::new(file), &mut writer, &self.config.provenance).await;
        let closed = writer.close().await;

        let (stats, staged) = match (transcoded, closed) {
            (Ok(stats), Ok(staged)) => (stats, staged),
            (Err(e), Ok(staged)) => {
                warn!(
                    uri = %staged.uri,
                    bytes = staged.size,
                    "Transcoding failed; staging object holds a partial stream"
                );
                return Err(e);
            },
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Failed to finalize staging object after transcoding error");
                return Err(e);
            },
            (Ok(_), Err(e)) => return Err(e),
        };

        info!(
            records = stats.records,
            bytes = stats.bytes,
            failed_tests = stats.failed_tests,
            uri = %staged.uri,
            "Test data staged"
        );

        info!("Loading data to warehouse...");
        let request = LoadRequest::append_ndjson(&staged.uri, self.config.warehouse.table_ref());
        let load = BulkLoader::new(self.warehouse, &self.config.load)
            .run(&request)
            .await?;

        let duration = start_time.elapsed();

        Ok(PipelineResult {
            stats,
            staged,
            load,
            duration_seconds: duration.as_secs_f64(),
        })
    }
}
