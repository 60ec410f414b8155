// src/input_format.rs - Log grammars and line parsers

use crate::error::ConfigError;
use crate::pipeline::context::{fields, LogRecord};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Supported log grammars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogFormat {
    /// `%h %l %u %t "%r" %>s %b "%{Referer}i" "%{User-agent}i"`
    ApacheCombined,
}

impl LogFormat {
    pub fn name(&self) -> &'static str {
        match self {
            LogFormat::ApacheCombined => "APACHE_COMBINED",
        }
    }

    /// Line parser implementing this grammar
    pub fn parser(&self) -> Box<dyn LineParser> {
        match self {
            LogFormat::ApacheCombined => Box::new(ApacheCombinedParser::new()),
        }
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::ApacheCombined
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APACHE_COMBINED" => Ok(LogFormat::ApacheCombined),
            _ => Err(ConfigError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for LogFormat {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Turns one raw line into a record. `None` means the line does not follow
/// the grammar; that is not an error, the line is simply dropped.
pub trait LineParser {
    fn parse_line(&self, line: &str) -> Option<LogRecord>;
    fn name(&self) -> &str;
}

/// Placeholder a log grammar uses for "not applicable"
pub const SENTINEL: &str = "-";

// Groups: 1 host, 2 identity, 3 user, 4 time, 5-7 request line (method, resource,
// protocol), 8 status, 9 size, 10 referer header, 11 user agent, 12-13 trailing tokens.
// Digit and word classes are spelled out: they must stay ASCII-only.
static APACHE_COMBINED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(\S+) (\S+) (\S+) \[([0-9A-Za-z_:/]+\s[+\-][0-9]{4})\] "(\S+)\s?(\S+)?\s?(\S+)?" ([0-9]{3}|-) ([0-9]+|-)\s?"?([^"]*)"?\s?"?([^"]*)?"?\s?(\S+)?\s?(\S+)?$"#,
    )
    .expect("Apache combined pattern must compile")
});

/// Apache Combined Log Format parser.
///
/// The requested resource (from the request line) is stored as `referer`; the
/// Referer header itself is matched but not kept. `userId` is dropped when it is
/// the `-` sentinel, while `statusCode` and `size` keep a literal `-`.
pub struct ApacheCombinedParser {
    regex: &'static Regex,
}

impl ApacheCombinedParser {
    pub fn new() -> Self {
        Self {
            regex: &APACHE_COMBINED_REGEX,
        }
    }
}

impl Default for ApacheCombinedParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-empty text of a capture group
fn non_empty<'t>(captures: &Captures<'t>, group: usize) -> Option<&'t str> {
    captures
        .get(group)
        .map(|m| m.as_str())
        .filter(|value| !value.is_empty())
}

impl LineParser for ApacheCombinedParser {
    fn parse_line(&self, line: &str) -> Option<LogRecord> {
        let captures = self.regex.captures(line)?;
        let mut record = LogRecord::new(line);

        if let Some(ip) = non_empty(&captures, 1) {
            record.insert_text(fields::IP, ip);
        }
        if let Some(user_id) = non_empty(&captures, 3).filter(|user| *user != SENTINEL) {
            record.insert_text(fields::USER_ID, user_id);
        }

        let mapping = [
            (4, fields::TIME),
            (5, fields::METHOD),
            (6, fields::REFERER),
            (7, fields::PROTOCOL),
            (8, fields::STATUS_CODE),
            (9, fields::SIZE),
            (11, fields::USER_AGENT),
            (12, fields::EXTRA1),
            (13, fields::EXTRA2),
        ];
        for (group, key) in mapping {
            if let Some(value) = non_empty(&captures, group) {
                record.insert_text(key, value);
            }
        }

        Some(record)
    }

    fn name(&self) -> &str {
        LogFormat::ApacheCombined.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"177.71.128.21 - - [10/Jul/2018:22:21:28 +0200] "GET /intranet-analytics/ HTTP/1.1" 200 3574 "-" "Mozilla/5.0 (X11; U; Linux x86_64; fr-FR) AppleWebKit/534.7""#;

    #[test]
    fn test_format_names() {
        assert_eq!("APACHE_COMBINED".parse::<LogFormat>().unwrap(), LogFormat::ApacheCombined);
        assert_eq!(LogFormat::ApacheCombined.to_string(), "APACHE_COMBINED");
        assert!(matches!(
            "apache_combined".parse::<LogFormat>(),
            Err(ConfigError::UnsupportedFormat(name)) if name == "apache_combined"
        ));
    }

    #[test]
    fn test_parse_full_line() {
        let record = ApacheCombinedParser::new().parse_line(LINE).unwrap();
        assert_eq!(record.raw(), LINE);
        assert_eq!(record.get_str("ip"), Some("177.71.128.21"));
        assert_eq!(record.get_str("time"), Some("10/Jul/2018:22:21:28 +0200"));
        assert_eq!(record.get_str("method"), Some("GET"));
        assert_eq!(record.get_str("referer"), Some("/intranet-analytics/"));
        assert_eq!(record.get_str("protocol"), Some("HTTP/1.1"));
        assert_eq!(record.get_str("statusCode"), Some("200"));
        assert_eq!(record.get_str("size"), Some("3574"));
        assert_eq!(
            record.get_str("userAgent"),
            Some("Mozilla/5.0 (X11; U; Linux x86_64; fr-FR) AppleWebKit/534.7")
        );
        assert!(!record.contains_key("userId"));
        assert!(!record.contains_key("extra1"));
        assert!(!record.contains_key("extra2"));
    }

    #[test]
    fn test_parse_non_matching_line() {
        let parser = ApacheCombinedParser::new();
        assert!(parser.parse_line("this is not an access log line").is_none());
        assert!(parser.parse_line("").is_none());
    }

    #[test]
    fn test_parser_name() {
        assert_eq!(LogFormat::ApacheCombined.parser().name(), "APACHE_COMBINED");
    }
}
