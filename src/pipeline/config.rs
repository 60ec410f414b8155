use crate::input_format::LogFormat;
use serde::Deserialize;

/// Configuration for a parser instance.
///
/// Deserializes from an options object such as `{"format": "APACHE_COMBINED"}`;
/// every field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub format: LogFormat,
    pub error_strategy: ErrorStrategy,
    /// Longest accepted line, in bytes. Checked once a line has been read in
    /// full, so it does not bound memory use.
    pub max_line_length: usize,
    pub buffer_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            format: LogFormat::ApacheCombined,
            error_strategy: ErrorStrategy::Skip,
            max_line_length: 1048576, // 1MB
            buffer_size: 65536,       // 64KB
        }
    }
}

/// How ingestion reacts to faults that are not grammar mismatches
/// (over-long lines, read failures in the middle of a source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Skip problematic lines and continue processing
    Skip,
    /// Stop processing on first error
    FailFast,
}
