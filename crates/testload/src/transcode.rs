//! Provenance-stamping NDJSON transcoder
//!
//! Reads test events line by line, stamps each with the run's
//! [`Provenance`], and writes them back out as newline-delimited JSON in
//! input order. The first bad line stops the run; lines already written stay
//! written.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument, trace};

use crate::error::{Error, Result};
use crate::record::{Action, Provenance, TestRecord};

/// Longest slice of an offending line carried in a decode error.
pub const MAX_RAW_CONTEXT_CHARS: usize = 256;

/// Counters for one transcoding pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    /// Records written
    pub records: u64,
    /// Bytes written, including newlines
    pub bytes: u64,
    /// Pass, fail, and skip events
    pub outcomes: u64,
    /// Fail events for individual tests
    pub failed_tests: u64,
}

/// Decode every record from `input`, stamp `provenance` on it, and write it
/// to `output`.
///
/// Blank lines are skipped. A line may hold several JSON values; each becomes
/// a record. Bytes that are not valid UTF-8 are replaced with U+FFFD. The
/// output is flushed before returning.
#[instrument(skip_all, fields(run = %provenance.run, stage = %provenance.stage))]
pub async fn transcode<R, W>(
    mut input: R,
    output: &mut W,
    provenance: &Provenance,
) -> Result<TranscodeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut stats = TranscodeStats::default();
    let mut line_number = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = input
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| Error::input(format!("failed to read line {}", line_number + 1), e))?;
        if read == 0 {
            break;
        }
        line_number += 1;

        let line = String::from_utf8_lossy(&buf);
        if line.trim().is_empty() {
            trace!(line = line_number, "Skipping blank line");
            continue;
        }

        for decoded in serde_json::Deserializer::from_str(&line).into_iter::<TestRecord>() {
            let mut record = decoded.map_err(|source| Error::Decode {
                line: line_number,
                raw: raw_context(line.trim_end()),
                source,
            })?;
            record.stamp(provenance);

            let mut encoded =
                serde_json::to_vec(&record).map_err(|e| Error::Write(std::io::Error::from(e)))?;
            encoded.push(b'\n');

            output.write_all(&encoded).await.map_err(Error::Write)?;

            stats.records += 1;
            stats.bytes += encoded.len() as u64;
            if record.action.is_outcome() {
                stats.outcomes += 1;
                if record.action == Action::Fail && record.test.is_some() {
                    stats.failed_tests += 1;
                }
            }
        }
    }

    output.flush().await.map_err(Error::Write)?;

    debug!(
        records = stats.records,
        bytes = stats.bytes,
        lines = line_number,
        "Transcoding finished"
    );

    Ok(stats)
}

fn raw_context(line: &str) -> String {
    if line.chars().count() <= MAX_RAW_CONTEXT_CHARS {
        line.to_string()
    } else {
        let head: String = line.chars().take(MAX_RAW_CONTEXT_CHARS).collect();
        format!("{head}...")
    }
}
