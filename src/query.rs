// src/query.rs - Chainable in-memory queries over parsed records

use crate::error::QueryError;
use crate::pipeline::context::{LogRecord, RecordStore};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

/// Working-set based query builder.
///
/// `start()` takes a snapshot of the record store; every other operation
/// works on that snapshot, so `sort` annotations and `limit` truncation never
/// reach the store itself.
#[derive(Debug, Default)]
pub struct QueryEngine {
    working_set: Option<Vec<LogRecord>>,
}

impl QueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.working_set.is_some()
    }

    /// Reset the working set to the current store contents
    pub fn start(&mut self, store: &RecordStore) -> &mut Self {
        self.working_set = Some(store.as_slice().to_vec());
        self
    }

    /// Keep only the first record of each group of duplicates.
    ///
    /// Without a key, records are duplicates when all of their fields are equal.
    /// With a key, records sharing a value for `key` are duplicates; records
    /// lacking `key` never count as duplicates of anything and are always kept.
    pub fn unique(&mut self, key: Option<&str>) -> Result<&mut Self, QueryError> {
        let working_set = self.working_set_mut()?;
        let mut seen = HashSet::new();

        working_set.retain(|record| match key {
            None => seen.insert(structural_key(record)),
            Some(key) => match record.get(key) {
                Some(value) => seen.insert(value_key(value)),
                None => true,
            },
        });

        Ok(self)
    }

    /// Rank records by how often their `key` value occurs in the working set.
    ///
    /// Every record gets a `<key>_occurences` field holding the number of
    /// records sharing its value (0 when the record lacks `key`). Records are
    /// then ordered by that count, most frequent first; ties keep their order.
    pub fn sort(&mut self, key: &str) -> Result<&mut Self, QueryError> {
        let working_set = self.working_set_mut()?;
        if key.is_empty() {
            return Err(QueryError::InvalidParameter {
                method: "sort",
                param: "key",
            });
        }

        let mut frequencies: HashMap<String, usize> = HashMap::new();
        for value in working_set.iter().filter_map(|record| record.get(key)) {
            *frequencies.entry(value_key(value)).or_default() += 1;
        }

        let counts: Vec<usize> = working_set
            .iter()
            .map(|record| {
                record
                    .get(key)
                    .map_or(0, |value| frequencies[&value_key(value)])
            })
            .collect();

        let mut ranked: Vec<(usize, LogRecord)> = counts
            .into_iter()
            .zip(working_set.drain(..))
            .map(|(count, mut record)| {
                record.set_occurrences(key, count);
                (count, record)
            })
            .collect();
        // stable: equal counts keep their relative order
        ranked.sort_by_key(|(count, _)| Reverse(*count));

        working_set.extend(ranked.into_iter().map(|(_, record)| record));
        Ok(self)
    }

    /// Keep the first `max` records of the working set
    pub fn limit(&mut self, max: usize) -> Result<&mut Self, QueryError> {
        let working_set = self.working_set_mut()?;
        if max < 1 {
            return Err(QueryError::InvalidParameter {
                method: "limit",
                param: "max",
            });
        }
        working_set.truncate(max);
        Ok(self)
    }

    /// Run a textual query step
    pub fn apply(&mut self, step: &QueryStep) -> Result<&mut Self, QueryError> {
        match step {
            QueryStep::Unique(key) => self.unique(key.as_deref()),
            QueryStep::Sort(key) => self.sort(key),
            QueryStep::Limit(max) => self.limit(*max),
        }
    }

    pub fn count(&self) -> Result<usize, QueryError> {
        Ok(self.working_set()?.len())
    }

    /// Current working set
    pub fn export(&self) -> Result<&[LogRecord], QueryError> {
        self.working_set()
    }

    /// Current working set as a JSON array
    pub fn to_json(&self) -> Result<Value, QueryError> {
        Ok(Value::Array(
            self.working_set()?.iter().map(LogRecord::to_json).collect(),
        ))
    }

    fn working_set(&self) -> Result<&[LogRecord], QueryError> {
        self.working_set.as_deref().ok_or(QueryError::NotStarted)
    }

    fn working_set_mut(&mut self) -> Result<&mut Vec<LogRecord>, QueryError> {
        self.working_set.as_mut().ok_or(QueryError::NotStarted)
    }
}

/// Hashable identity of a field value; numbers and strings never collide
fn value_key(value: &Value) -> String {
    value.to_string()
}

/// Hashable identity of a whole record, independent of field order
fn structural_key(record: &LogRecord) -> String {
    let ordered: BTreeMap<&String, &Value> = record.fields().iter().collect();
    serde_json::to_string(&ordered).unwrap_or_else(|_| record.raw().to_string())
}

/// One step of a textual query: `unique`, `unique=KEY`, `sort=KEY` or `limit=N`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStep {
    Unique(Option<String>),
    Sort(String),
    Limit(usize),
}

impl FromStr for QueryStep {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QueryError::InvalidStep(s.to_string());
        let (name, argument) = match s.trim().split_once('=') {
            Some((name, argument)) => (name.trim(), Some(argument.trim())),
            None => (s.trim(), None),
        };

        match (name, argument) {
            ("unique", None) => Ok(QueryStep::Unique(None)),
            ("unique", Some(key)) if !key.is_empty() => Ok(QueryStep::Unique(Some(key.to_string()))),
            ("sort", Some(key)) if !key.is_empty() => Ok(QueryStep::Sort(key.to_string())),
            ("limit", Some(max)) => max.parse().map(QueryStep::Limit).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}
