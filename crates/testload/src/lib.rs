//! testload
//!
//! Loads `go test -json` output into a BigQuery table. Each test event is
//! stamped with the CI run that produced it, staged as newline-delimited JSON
//! in an object store bucket, and appended to the table with a bulk load job.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use testload::config::Config;
//! use testload::pipeline::Pipeline;
//! use testload::storage::Storage;
//! use testload::warehouse::BigQuery;
//!
//! #[tokio::main]
//! async fn main() -> testload::Result<()> {
//!     let config = Config::load()?;
//!     let storage = Storage::new(config.storage.clone()).await?;
//!     let warehouse = BigQuery::new(&config.warehouse)?;
//!
//!     let result = Pipeline::new(&config, &storage, &warehouse)
//!         .run(Path::new("test-results.json"))
//!         .await?;
//!     println!("loaded {} records", result.stats.records);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod storage;
pub mod transcode;
pub mod warehouse;

pub use error::{Error, Result};
