// src/report.rs - Summary report over a parsed log
use crate::error::QueryError;
use crate::pipeline::context::fields;
use crate::pipeline::stream::LogParser;
use std::fmt;

/// Traffic summary: unique clients, most visited URLs, most active clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub top: usize,
    pub unique_ips: usize,
    pub top_urls: Vec<String>,
    pub top_ips: Vec<String>,
}

impl Report {
    pub fn build(parser: &mut LogParser, top: usize) -> Result<Self, QueryError> {
        let unique_ips = parser.start().unique(Some(fields::IP))?.count()?;
        let top_urls = Self::most_frequent(parser, fields::REFERER, top)?;
        let top_ips = Self::most_frequent(parser, fields::IP, top)?;

        Ok(Report {
            top,
            unique_ips,
            top_urls,
            top_ips,
        })
    }

    /// Most frequent distinct values of `key`, most frequent first
    fn most_frequent(parser: &mut LogParser, key: &str, top: usize) -> Result<Vec<String>, QueryError> {
        let records = parser
            .start()
            .sort(key)?
            .unique(Some(key))?
            .limit(top)?
            .export()?;
        Ok(records
            .iter()
            .filter_map(|record| record.get_str(key))
            .map(str::to_string)
            .collect())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Number of unique IP addresses:")?;
        writeln!(f, "{}", self.unique_ips)?;
        writeln!(f)?;
        writeln!(f, "# Top {} most visited URLs:", self.top)?;
        for url in &self.top_urls {
            writeln!(f, "{}", url)?;
        }
        writeln!(f)?;
        writeln!(f, "# Top {} most active IP addresses:", self.top)?;
        for ip in &self.top_ips {
            writeln!(f, "{}", ip)?;
        }
        Ok(())
    }
}
