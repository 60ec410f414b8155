// src/lib.rs
pub mod error;
pub mod formatters;
pub mod input_format;
pub mod output_format;
pub mod pipeline;
pub mod query;
pub mod report;

pub use error::*;

pub use input_format::{ApacheCombinedParser, LineParser, LogFormat};
pub use output_format::{OutputFormat, OutputFormatter};
pub use pipeline::config::{ErrorStrategy, ParserConfig};
pub use pipeline::context::{fields, IngestState, IngestStats, LogRecord, RecordStore};
pub use pipeline::stream::{ListenerId, LogParser, ParserEvent};
pub use query::{QueryEngine, QueryStep};
pub use report::Report;
