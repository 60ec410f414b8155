use crate::error::OutputError;
use crate::formatters::logfmt::LogfmtFormatter;
use crate::formatters::RecordFormatter;
use crate::pipeline::context::LogRecord;
use serde_json::Value;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    #[value(name = "jsonl", help = "JSON Lines format (one JSON object per line)")]
    Jsonl,
    #[value(name = "logfmt", help = "Logfmt format (key=value pairs)")]
    Logfmt,
    #[value(name = "csv", help = "Comma-separated values")]
    Csv,
    #[value(name = "raw", help = "Original log lines")]
    Raw,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(OutputFormat::Jsonl),
            "logfmt" => Ok(OutputFormat::Logfmt),
            "csv" => Ok(OutputFormat::Csv),
            "raw" => Ok(OutputFormat::Raw),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jsonl
    }
}

/// Writes query results in one of the output formats
pub struct OutputFormatter {
    format: OutputFormat,
    keys: Option<Vec<String>>,
    csv_header: Option<Vec<String>>,
    logfmt: LogfmtFormatter,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, keys: Option<Vec<String>>) -> Self {
        OutputFormatter {
            format,
            keys,
            csv_header: None,
            logfmt: LogfmtFormatter::new(),
        }
    }

    /// Restrict a record to the selected keys, in selection order
    fn filter_keys(&self, record: &LogRecord) -> Value {
        match self.keys {
            Some(ref key_list) => {
                let mut filtered = serde_json::Map::new();
                for key in key_list {
                    if let Some(value) = record.get(key) {
                        filtered.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(filtered)
            }
            None => record.to_json(),
        }
    }

    pub fn write_records<W: Write>(
        &mut self,
        output: &mut W,
        records: &[LogRecord],
    ) -> Result<(), OutputError> {
        for record in records {
            self.write_record(output, record)?;
        }
        Ok(())
    }

    pub fn write_record<W: Write>(
        &mut self,
        output: &mut W,
        record: &LogRecord,
    ) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Jsonl => {
                let json_line = serde_json::to_string(&self.filter_keys(record))?;
                writeln!(output, "{}", json_line)?;
            }
            OutputFormat::Logfmt => {
                let line = self
                    .logfmt
                    .format_record_with_keys(record, self.keys.as_deref());
                writeln!(output, "{}", line)?;
            }
            OutputFormat::Csv => self.write_csv(output, record)?,
            OutputFormat::Raw => {
                writeln!(output, "{}", record.raw())?;
            }
        }
        Ok(())
    }

    fn write_csv<W: Write>(&mut self, output: &mut W, record: &LogRecord) -> Result<(), OutputError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(output);

        // Header comes from --keys, or from the first record written
        let header = match self.csv_header {
            Some(ref header) => header.clone(),
            None => {
                let header = self.keys.clone().unwrap_or_else(|| {
                    record.fields().keys().cloned().collect()
                });
                writer.write_record(&header)?;
                self.csv_header = Some(header.clone());
                header
            }
        };

        let values: Vec<String> = header
            .iter()
            .map(|key| match record.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&values)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input_format::{ApacheCombinedParser, LineParser};

    const LINES: [&str; 2] = [
        r#"168.41.191.9 - - [09/Jul/2018:10:10:38 +0200] "GET /most-visited HTTP/1.1" 200 3574 "-" "curl/7.58.0""#,
        r#"72.44.32.10 - admin [09/Jul/2018:15:48:07 +0200] "GET /faq/ HTTP/1.1" 404 - "-" "curl/7.58.0""#,
    ];

    fn records() -> Vec<LogRecord> {
        let parser = ApacheCombinedParser::new();
        LINES.iter().map(|line| parser.parse_line(line).unwrap()).collect()
    }

    fn render(format: OutputFormat, keys: Option<Vec<String>>) -> String {
        let mut formatter = OutputFormatter::new(format, keys);
        let mut output = Vec::new();
        formatter.write_records(&mut output, &records()).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_jsonl_with_keys() {
        let output = render(
            OutputFormat::Jsonl,
            Some(vec!["referer".to_string(), "userId".to_string()]),
        );
        assert_eq!(
            output,
            "{\"referer\":\"/most-visited\"}\n{\"referer\":\"/faq/\",\"userId\":\"admin\"}\n"
        );
    }

    #[test]
    fn test_csv_header_from_keys() {
        let output = render(
            OutputFormat::Csv,
            Some(vec!["ip".to_string(), "userId".to_string(), "size".to_string()]),
        );
        assert_eq!(output, "ip,userId,size\n168.41.191.9,,3574\n72.44.32.10,admin,-\n");
    }

    #[test]
    fn test_raw_output() {
        let output = render(OutputFormat::Raw, None);
        assert_eq!(output, format!("{}\n{}\n", LINES[0], LINES[1]));
    }

    #[test]
    fn test_parse_output_format() {
        assert_eq!("JSONL".parse::<OutputFormat>().unwrap(), OutputFormat::Jsonl);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
