use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Field names produced by the line parsers
pub mod fields {
    pub const RAW: &str = "raw";
    pub const IP: &str = "ip";
    pub const USER_ID: &str = "userId";
    pub const TIME: &str = "time";
    pub const METHOD: &str = "method";
    pub const REFERER: &str = "referer";
    pub const PROTOCOL: &str = "protocol";
    pub const STATUS_CODE: &str = "statusCode";
    pub const SIZE: &str = "size";
    pub const USER_AGENT: &str = "userAgent";
    pub const EXTRA1: &str = "extra1";
    pub const EXTRA2: &str = "extra2";

    /// Suffix of the counter field added by `sort` (sic).
    pub const OCCURRENCES_SUFFIX: &str = "_occurences";

    /// Name of the counter field `sort(key)` writes onto each record
    pub fn occurrences_field(key: &str) -> String {
        format!("{}{}", key, OCCURRENCES_SUFFIX)
    }
}

/// Timestamp layout of the bracketed `time` field, e.g. `10/Jul/2018:22:21:28 +0200`
pub const TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// One parsed log line.
///
/// Fields are kept as a JSON object so that query operations can attach new
/// fields (`<key>_occurences`) at runtime. Parsed fields are always strings;
/// only the occurrence counters are numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: Map<String, Value>,
}

impl LogRecord {
    /// Create a record holding only the original line
    pub fn new(raw: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(fields::RAW.to_string(), Value::String(raw.into()));
        LogRecord { fields: map }
    }

    pub fn raw(&self) -> &str {
        self.get_str(fields::RAW).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field as text, `None` if missing or not a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Occurrence count written by the last `sort(key)` that saw this record
    pub fn occurrences(&self, key: &str) -> Option<u64> {
        self.fields
            .get(&fields::occurrences_field(key))
            .and_then(Value::as_u64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse the `time` field; the stored value stays text
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.get_str(fields::TIME)
            .and_then(|time| DateTime::parse_from_str(time, TIME_FORMAT).ok())
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub(crate) fn insert_text(&mut self, key: &str, value: &str) {
        self.fields
            .insert(key.to_string(), Value::String(value.to_string()));
    }

    pub(crate) fn set_occurrences(&mut self, key: &str, count: usize) {
        self.fields
            .insert(fields::occurrences_field(key), Value::from(count));
    }
}

/// Ordered, append-only collection of parsed records owned by one parser
#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    records: Vec<LogRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[LogRecord] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a RecordStore {
    type Item = &'a LogRecord;
    type IntoIter = std::slice::Iter<'a, LogRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Ingestion lifecycle of a parser instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    Ingesting,
    Completed,
}

/// Statistics for one ingestion run (or the running total of an instance)
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub source: Option<String>,
    pub lines_seen: usize,
    pub records_parsed: usize,
    pub lines_unmatched: usize,
    pub lines_too_long: usize,
    pub errors: usize,
    pub processing_time: Duration,
    pub earliest_timestamp: Option<DateTime<FixedOffset>>,
    pub latest_timestamp: Option<DateTime<FixedOffset>>,
}

impl IngestStats {
    /// Update stats with a freshly parsed record
    pub fn update_with_record(&mut self, record: &LogRecord) {
        self.records_parsed += 1;
        if let Some(timestamp) = record.timestamp() {
            self.update_timestamp_range(timestamp);
        }
    }

    fn update_timestamp_range(&mut self, timestamp: DateTime<FixedOffset>) {
        if self.earliest_timestamp.map_or(true, |earliest| timestamp < earliest) {
            self.earliest_timestamp = Some(timestamp);
        }
        if self.latest_timestamp.map_or(true, |latest| timestamp > latest) {
            self.latest_timestamp = Some(timestamp);
        }
    }

    /// Fold the stats of a finished run into a running total
    pub fn merge(&mut self, run: &IngestStats) {
        if run.source.is_some() {
            self.source = run.source.clone();
        }
        self.lines_seen += run.lines_seen;
        self.records_parsed += run.records_parsed;
        self.lines_unmatched += run.lines_unmatched;
        self.lines_too_long += run.lines_too_long;
        self.errors += run.errors;
        self.processing_time += run.processing_time;
        if let Some(earliest) = run.earliest_timestamp {
            self.update_timestamp_range(earliest);
        }
        if let Some(latest) = run.latest_timestamp {
            self.update_timestamp_range(latest);
        }
    }
}
