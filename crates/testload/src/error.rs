//! Error types for testload
//!
//! Every failure aborts the run. Each variant names the stage that failed so
//! the top-level handler can print a one-line diagnostic.

use thiserror::Error;

/// Result type alias for testload operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline error, one variant per failing stage
#[derive(Error, Debug)]
pub enum Error {
    /// Required setting missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Input file could not be opened or read
    #[error("input error: {context}: {source}")]
    Input {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A line of the input is not a valid test event
    #[error("decode error at line {line}: {source} (record: {raw})")]
    Decode {
        line: usize,
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// Object store unreachable, access denied, or upload rejected
    #[error("storage error: {0}")]
    Storage(String),

    /// Serializing or writing an enriched record failed
    #[error("write error: {0}")]
    Write(#[source] std::io::Error),

    /// The warehouse did not accept the load job
    #[error("load submission failed: {0}")]
    Submission(String),

    /// The load job could not be observed to completion
    #[error("waiting for load job {job_id} failed: {message}")]
    Wait { job_id: String, message: String },

    /// The load job finished unsuccessfully
    #[error("load job {job_id} completed with error: {message}")]
    Load { job_id: String, message: String },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn input(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Input {
            context: context.into(),
            source,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    pub fn wait(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Wait {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    /// Short name of the pipeline stage that produced this error
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Input { .. } => "input",
            Error::Decode { .. } => "decode",
            Error::Storage(_) => "storage",
            Error::Write(_) => "write",
            Error::Submission(_) => "submission",
            Error::Wait { .. } => "wait",
            Error::Load { .. } => "load",
        }
    }
}
