//! Test event records
//!
//! A [`TestRecord`] is one line of `go test -json` (test2json) output plus the
//! five [`Provenance`] fields identifying the CI run that produced it.
//!
//! Decoding is lenient: any field may be missing or `null` and resolves to an
//! empty value. Encoding is total: every key is always written, in a fixed
//! order, so downstream schema detection sees a stable shape.

use chrono::{DateTime, FixedOffset, Timelike};
use serde::de::{self, MapAccess};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Seconds from 0001-01-01T00:00:00Z to the Unix epoch.
const ZERO_TIME_UNIX_SECS: i64 = -62_135_596_800;

/// Instant of a test event, encoded as an RFC 3339 string.
///
/// Fractional seconds are written with trailing zeros trimmed and a zero UTC
/// offset is written as `Z`, which matches what test2json emits. The default
/// value is `0001-01-01T00:00:00Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(DateTime<FixedOffset>);

impl Timestamp {
    pub fn parse(raw: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(Self)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        let zero = DateTime::from_timestamp(ZERO_TIME_UNIX_SECS, 0).unwrap_or_default();
        Self(zero.fixed_offset())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S"))?;

        // Leap seconds are represented as nanos >= 1e9.
        let nanos = self.0.nanosecond() % 1_000_000_000;
        if nanos > 0 {
            let digits = format!("{nanos:09}");
            write!(f, ".{}", digits.trim_end_matches('0'))?;
        }

        if self.0.offset().local_minus_utc() == 0 {
            f.write_str("Z")
        } else {
            write!(f, "{}", self.0.format("%:z"))
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .map_err(|e| de::Error::custom(format!("invalid RFC 3339 time {raw:?}: {e}")))
    }
}

/// Kind of test event.
///
/// The named variants are the actions test2json documents. Anything else is
/// kept verbatim in [`Action::Other`] so re-encoding never alters the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    /// The test binary is about to be executed
    Start,
    /// The test has started running
    Run,
    /// The test has been paused
    Pause,
    /// The test has continued running
    Cont,
    /// The test passed
    Pass,
    /// The benchmark printed log output but did not fail
    Bench,
    /// The test or benchmark failed
    Fail,
    /// The test printed output
    Output,
    /// The test was skipped or the package contained no tests
    Skip,
    /// Unrecognized action, including the empty string
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Start => "start",
            Action::Run => "run",
            Action::Pause => "pause",
            Action::Cont => "cont",
            Action::Pass => "pass",
            Action::Bench => "bench",
            Action::Fail => "fail",
            Action::Output => "output",
            Action::Skip => "skip",
            Action::Other(raw) => raw,
        }
    }

    /// Whether this event closes a test or package (pass, fail, skip)
    pub fn is_outcome(&self) -> bool {
        matches!(self, Action::Pass | Action::Fail | Action::Skip)
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::Other(String::new())
    }
}

impl From<String> for Action {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "start" => Action::Start,
            "run" => Action::Run,
            "pause" => Action::Pause,
            "cont" => Action::Cont,
            "pass" => Action::Pass,
            "bench" => Action::Bench,
            "fail" => Action::Fail,
            "output" => Action::Output,
            "skip" => Action::Skip,
            _ => Action::Other(raw),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-identifying fields stamped onto every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Source repository URL
    #[serde(rename = "Repo")]
    pub repo: String,

    /// Branch name
    #[serde(rename = "Branch")]
    pub branch: String,

    /// Commit SHA
    #[serde(rename = "Commit")]
    pub commit: String,

    /// CI run (build) identifier
    #[serde(rename = "Run")]
    pub run: String,

    /// Pipeline stage name
    #[serde(rename = "Stage")]
    pub stage: String,
}

impl Provenance {
    pub fn new(
        repo: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
        run: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            commit: commit.into(),
            run: run.into(),
            stage: stage.into(),
        }
    }
}

/// One test event with its provenance.
///
/// Decoding follows `encoding/json`: keys match field names ignoring ASCII
/// case, a repeated key overwrites the earlier value, `null` leaves a field
/// unchanged, and unknown keys are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestRecord {
    #[serde(rename = "Time")]
    pub time: Timestamp,

    #[serde(rename = "Action")]
    pub action: Action,

    #[serde(rename = "Package")]
    pub package: String,

    /// Absent for package-level events
    #[serde(rename = "Test", serialize_with = "none_as_empty")]
    pub test: Option<String>,

    /// Seconds; present on pass/fail/skip events
    #[serde(rename = "Elapsed", serialize_with = "serialize_elapsed")]
    pub elapsed: Option<f64>,

    /// Present on output events
    #[serde(rename = "Output", serialize_with = "none_as_empty")]
    pub output: Option<String>,

    #[serde(flatten)]
    pub provenance: Provenance,
}

impl TestRecord {
    /// Overwrite all provenance fields with `provenance`.
    pub fn stamp(&mut self, provenance: &Provenance) {
        self.provenance.clone_from(provenance);
    }
}

/// Wire keys in output order
const FIELDS: [&str; 11] = [
    "Time", "Action", "Package", "Test", "Elapsed", "Output", "Repo", "Branch", "Commit", "Run",
    "Stage",
];

enum Field {
    Time,
    Action,
    Package,
    Test,
    Elapsed,
    Output,
    Repo,
    Branch,
    Commit,
    Run,
    Stage,
    Ignore,
}

impl Field {
    fn from_key(key: &str) -> Self {
        match FIELDS.iter().position(|name| name.eq_ignore_ascii_case(key)) {
            Some(0) => Field::Time,
            Some(1) => Field::Action,
            Some(2) => Field::Package,
            Some(3) => Field::Test,
            Some(4) => Field::Elapsed,
            Some(5) => Field::Output,
            Some(6) => Field::Repo,
            Some(7) => Field::Branch,
            Some(8) => Field::Commit,
            Some(9) => Field::Run,
            Some(10) => Field::Stage,
            _ => Field::Ignore,
        }
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldVisitor;

        impl de::Visitor<'_> for FieldVisitor {
            type Value = Field;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a field name")
            }

            fn visit_str<E: de::Error>(self, key: &str) -> Result<Field, E> {
                Ok(Field::from_key(key))
            }
        }

        deserializer.deserialize_identifier(FieldVisitor)
    }
}

impl<'de> Deserialize<'de> for TestRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TestRecordVisitor)
    }
}

struct TestRecordVisitor;

impl<'de> de::Visitor<'de> for TestRecordVisitor {
    type Value = TestRecord;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a test event object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TestRecord, A::Error> {
        let mut record = TestRecord::default();

        while let Some(field) = map.next_key::<Field>()? {
            match field {
                Field::Time => assign(&mut map, &mut record.time)?,
                Field::Action => assign(&mut map, &mut record.action)?,
                Field::Package => assign(&mut map, &mut record.package)?,
                Field::Test => assign_text(&mut map, &mut record.test)?,
                Field::Elapsed => {
                    if let Some(secs) = map.next_value::<Option<f64>>()? {
                        record.elapsed = Some(secs);
                    }
                },
                Field::Output => assign_text(&mut map, &mut record.output)?,
                Field::Repo => assign(&mut map, &mut record.provenance.repo)?,
                Field::Branch => assign(&mut map, &mut record.provenance.branch)?,
                Field::Commit => assign(&mut map, &mut record.provenance.commit)?,
                Field::Run => assign(&mut map, &mut record.provenance.run)?,
                Field::Stage => assign(&mut map, &mut record.provenance.stage)?,
                Field::Ignore => {
                    map.next_value::<de::IgnoredAny>()?;
                },
            }
        }

        Ok(record)
    }
}

/// Store the next value in `slot` unless it is `null`.
fn assign<'de, A, T>(map: &mut A, slot: &mut T) -> Result<(), A::Error>
where
    A: MapAccess<'de>,
    T: Deserialize<'de>,
{
    if let Some(value) = map.next_value::<Option<T>>()? {
        *slot = value;
    }
    Ok(())
}

/// Like [`assign`], with the empty string stored as `None`.
fn assign_text<'de, A>(map: &mut A, slot: &mut Option<String>) -> Result<(), A::Error>
where
    A: MapAccess<'de>,
{
    if let Some(text) = map.next_value::<Option<String>>()? {
        *slot = Some(text).filter(|t| !t.is_empty());
    }
    Ok(())
}

fn none_as_empty<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or_default())
}

/// Largest magnitude below which an integral f64 is exactly an i64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn serialize_elapsed<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let secs = value.unwrap_or(0.0);
    if secs.fract() == 0.0 && secs.abs() < MAX_EXACT_INTEGER {
        serializer.serialize_i64(secs as i64)
    } else {
        serializer.serialize_f64(secs)
    }
}
