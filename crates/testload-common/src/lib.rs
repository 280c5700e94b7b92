//! testload common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient plumbing shared by the testload workspace members.
//!
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`] set up
//!   the `tracing` subscriber used by every binary.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LogOutput};
