//! testload - load `go test -json` results into BigQuery

use clap::Parser;
use std::path::PathBuf;
use std::process;
use testload::config::Config;
use testload::pipeline::{Pipeline, PipelineResult};
use testload::storage::Storage;
use testload::warehouse::BigQuery;
use testload_common::logging::{init_logging, LogConfig, LogLevel};
use tracing::{debug, info};

/// Noisy SDK internals kept at warn unless LOG_FILTER says otherwise.
const DEFAULT_FILTER_DIRECTIVES: &str = "aws_config=warn,aws_smithy_runtime=warn,hyper_util=warn";

#[derive(Parser, Debug)]
#[command(name = "testload")]
#[command(author, version, about = "Load go test -json results into BigQuery")]
struct Cli {
    /// File of newline-delimited test events
    input: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let defaults = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("testload")
        .filter_directives(DEFAULT_FILTER_DIRECTIVES)
        .build();

    // Environment variables take precedence over flags
    match LogConfig::from_env_or(defaults) {
        Ok(log_config) => {
            if let Err(e) = init_logging(&log_config) {
                eprintln!("Warning: failed to initialize logging: {e:#}");
            }
        },
        Err(e) => eprintln!("Warning: invalid logging configuration: {e:#}"),
    }

    match run(&cli).await {
        Ok(result) => {
            info!(
                records = result.stats.records,
                bytes = result.staged.size,
                sha256 = %result.staged.sha256,
                uri = %result.staged.uri,
                job_id = %result.load.job_id,
                output_rows = ?result.load.output_rows,
                duration_seconds = result.duration_seconds,
                "Test results loaded"
            );
        },
        Err(e) => {
            debug!(stage = e.stage(), error = %e, "Run failed");
            eprintln!("Error: {e}");
            process::exit(1);
        },
    }
}

async fn run(cli: &Cli) -> testload::Result<PipelineResult> {
    let config = Config::load()?;

    info!(
        table = %config.warehouse.table_ref(),
        bucket = %config.storage.bucket,
        run = %config.provenance.run,
        "Starting test result load"
    );

    let storage = Storage::new(config.storage.clone()).await?;
    let warehouse = BigQuery::new(&config.warehouse)?;

    Pipeline::new(&config, &storage, &warehouse)
        .run(&cli.input)
        .await
}
