use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use loggio::{
    ErrorStrategy, LogFormat, LogParser, OutputFormat, OutputFormatter, ParserConfig, QueryStep,
    Report,
};

#[derive(Parser)]
#[command(name = "loggio")]
#[command(about = "Parse web-server access logs and query them")]
#[command(version)]
struct Args {
    /// Log files to read (in order, appended into one record set)
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Log grammar of the input files
    #[arg(short = 'F', long = "format", default_value = "APACHE_COMBINED")]
    format: String,

    /// Query step: unique, unique=KEY, sort=KEY or limit=N (applied in order)
    #[arg(short = 'q', long = "query", value_name = "STEP", action = ArgAction::Append)]
    steps: Vec<String>,

    /// Print the number of records in the result instead of the records
    #[arg(long, requires = "steps")]
    count: bool,

    /// Output only these keys, comma separated
    #[arg(short = 'k', long = "keys", value_delimiter = ',', requires = "steps")]
    keys: Option<Vec<String>>,

    /// Output format for query results [default: jsonl]
    #[arg(short = 'o', long = "output-format", value_enum, requires = "steps")]
    output_format: Option<OutputFormat>,

    /// Number of entries per section in the summary report
    #[arg(long, default_value = "3")]
    top: usize,

    /// Fail on over-long lines and read errors instead of skipping them
    #[arg(long)]
    fail_fast: bool,

    /// Maximum line length
    #[arg(long, default_value = "1048576")] // 1MB
    max_line_length: usize,

    /// Buffer size for I/O
    #[arg(long, default_value = "65536")] // 64KB
    buffer_size: usize,

    /// Debug mode - log ingestion details to stderr
    #[arg(long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("LOGGIO_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("loggio: error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether any record made it into the output
fn run(args: Args) -> Result<bool> {
    let format: LogFormat = args.format.parse()?;
    let steps = args
        .steps
        .iter()
        .map(|step| step.parse::<QueryStep>())
        .collect::<Result<Vec<_>, _>>()?;

    let config = ParserConfig {
        format,
        error_strategy: if args.fail_fast {
            ErrorStrategy::FailFast
        } else {
            ErrorStrategy::Skip
        },
        max_line_length: args.max_line_length,
        buffer_size: args.buffer_size,
    };
    let mut parser = LogParser::new(config);

    for path in &args.files {
        let stats = parser
            .read(path)
            .with_context(|| format!("Failed to ingest '{}'", path.display()))?;
        tracing::debug!(
            file = %path.display(),
            records = stats.records_parsed,
            unmatched = stats.lines_unmatched,
            "loggio: file ingested"
        );
    }

    let stdout = io::stdout();
    let mut output = io::BufWriter::with_capacity(args.buffer_size, stdout.lock());

    let produced = if steps.is_empty() {
        let report = Report::build(&mut parser, args.top)?;
        write!(output, "{}", report)?;
        !parser.logs().is_empty()
    } else {
        let engine = parser.start();
        for step in &steps {
            engine.apply(step)?;
        }

        if args.count {
            writeln!(output, "{}", engine.count()?)?;
            true
        } else {
            let records = engine.export()?;
            let mut formatter = OutputFormatter::new(args.output_format.unwrap_or_default(), args.keys.clone());
            formatter.write_records(&mut output, records)?;
            !records.is_empty()
        }
    };

    output.flush()?;
    Ok(produced)
}
