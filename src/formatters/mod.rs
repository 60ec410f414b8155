use crate::pipeline::context::LogRecord;

pub mod logfmt;

/// Renders one record as a single output line
pub trait RecordFormatter {
    /// Every field, in the formatter's preferred order
    fn format_record(&self, record: &LogRecord) -> String;

    /// Only `keys`, in the given order; all fields when `keys` is `None`
    fn format_record_with_keys(&self, record: &LogRecord, keys: Option<&[String]>) -> String;
}
