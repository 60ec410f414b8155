use crate::formatters::RecordFormatter;
use crate::pipeline::context::{fields, LogRecord};
use serde_json::Value;

/// Standard logfmt formatter (space-separated key=value pairs)
pub struct LogfmtFormatter {
    leading_keys: Vec<&'static str>,
    trailing_keys: Vec<&'static str>,
}

impl Default for LogfmtFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogfmtFormatter {
    pub fn new() -> Self {
        Self {
            leading_keys: vec![fields::TIME, fields::IP],
            trailing_keys: vec![fields::RAW],
        }
    }

    /// Render a field value as logfmt text
    fn value_to_string(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            other => serde_json::to_string(other).unwrap_or_else(|_| "null".to_string()),
        }
    }

    /// Order keys: time and ip first, raw last, everything else in record order
    pub fn key_order<'a>(&self, record: &'a LogRecord) -> Vec<&'a str> {
        let mut keys: Vec<&str> = record.fields().keys().map(String::as_str).collect();
        keys.sort_by_key(|key| {
            if let Some(position) = self.leading_keys.iter().position(|k| k == key) {
                (0, position)
            } else if self.trailing_keys.iter().any(|k| k == key) {
                (2, 0)
            } else {
                (1, 0)
            }
        });
        keys
    }

    /// Format a single key=value pair
    pub fn format_key_value_pair(&self, key: &str, value: &str) -> String {
        if self.needs_quoting(value) {
            format!("{}=\"{}\"", key, self.escape_quotes(value))
        } else {
            format!("{}={}", key, value)
        }
    }

    /// Check if value needs to be quoted per logfmt rules
    fn needs_quoting(&self, value: &str) -> bool {
        value.is_empty()
            || value.contains(' ')
            || value.contains('\t')
            || value.contains('\n')
            || value.contains('"')
            || value.contains('=')
    }

    fn escape_quotes(&self, value: &str) -> String {
        value.replace('\\', "\\\\").replace('"', "\\\"")
    }

    fn format_keys(&self, record: &LogRecord, keys: &[&str]) -> String {
        keys.iter()
            .filter_map(|key| {
                record
                    .get(key)
                    .map(|value| self.format_key_value_pair(key, &Self::value_to_string(value)))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl RecordFormatter for LogfmtFormatter {
    fn format_record(&self, record: &LogRecord) -> String {
        let keys = self.key_order(record);
        self.format_keys(record, &keys)
    }

    fn format_record_with_keys(&self, record: &LogRecord, keys: Option<&[String]>) -> String {
        match keys {
            Some(keys) => {
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                self.format_keys(record, &keys)
            }
            None => self.format_record(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input_format::{ApacheCombinedParser, LineParser};

    const LINE: &str = r#"72.44.32.10 - admin [09/Jul/2018:15:48:07 +0200] "GET /faq/ HTTP/1.1" 200 3574 "-" "Mozilla/5.0""#;

    fn record() -> LogRecord {
        ApacheCombinedParser::new().parse_line(LINE).unwrap()
    }

    #[test]
    fn test_field_priority_order() {
        let formatter = LogfmtFormatter::new();
        let result = formatter.format_record(&record());

        assert!(result.starts_with("time=\"09/Jul/2018:15:48:07 +0200\" ip=72.44.32.10 "));
        assert!(result.find("userId=admin").unwrap() < result.find("referer=/faq/").unwrap());
        assert!(result.ends_with(&format!("raw=\"{}\"", LINE.replace('"', "\\\""))));
    }

    #[test]
    fn test_quoting_behavior() {
        let formatter = LogfmtFormatter::new();
        assert_eq!(formatter.format_key_value_pair("simple", "value"), "simple=value");
        assert_eq!(formatter.format_key_value_pair("spaced", "has spaces"), "spaced=\"has spaces\"");
        assert_eq!(formatter.format_key_value_pair("empty", ""), "empty=\"\"");
        assert_eq!(formatter.format_key_value_pair("quoted", "has\"quotes"), "quoted=\"has\\\"quotes\"");
    }

    #[test]
    fn test_selected_keys() {
        let formatter = LogfmtFormatter::new();
        let keys = vec!["referer".to_string(), "missing".to_string(), "ip".to_string()];
        assert_eq!(
            formatter.format_record_with_keys(&record(), Some(&keys)),
            "referer=/faq/ ip=72.44.32.10"
        );
    }

    #[test]
    fn test_no_key_selection_prints_every_field() {
        let formatter = LogfmtFormatter::new();
        let record = record();
        assert_eq!(
            formatter.format_record_with_keys(&record, None),
            formatter.format_record(&record)
        );
    }
}
