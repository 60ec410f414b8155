#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Format '{0}' is not supported")]
    UnsupportedFormat(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("File '{path}' doesn't exist or can't be read: {source}")]
    SourceUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line_number} too long: {length} > {max_length}")]
    LineTooLong {
        line_number: usize,
        length: usize,
        max_length: usize,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query not started: call start() before any other query method")]
    NotStarted,

    #[error("Missing or invalid '{param}' parameter for .{method}() query method")]
    InvalidParameter {
        method: &'static str,
        param: &'static str,
    },

    #[error("Invalid query step '{0}': expected unique, unique=KEY, sort=KEY or limit=N")]
    InvalidStep(String),
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),
}
