// src/pipeline/stream.rs
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{ConfigError, IngestError};
use crate::input_format::{LineParser, LogFormat};
use crate::pipeline::config::{ErrorStrategy, ParserConfig};
use crate::pipeline::context::{IngestState, IngestStats, RecordStore};
use crate::query::QueryEngine;

/// Events a parser instance publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserEvent {
    /// An ingestion run consumed its whole source
    Data,
}

/// Handle returned by [`LogParser::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

type Listener = Box<dyn FnMut(&mut LogParser)>;

/// A log file parser: owns the record store, the query engine, and the
/// completion listeners.
pub struct LogParser {
    config: ParserConfig,
    line_parser: Box<dyn LineParser>,
    store: RecordStore,
    engine: QueryEngine,
    state: IngestState,
    stats: IngestStats,
    listeners: Vec<(ListenerId, ParserEvent, Listener)>,
    next_listener_id: usize,
    dispatching: Vec<Vec<ListenerId>>,
    removed_while_dispatching: Vec<ListenerId>,
}

impl LogParser {
    pub fn new(config: ParserConfig) -> Self {
        LogParser {
            line_parser: config.format.parser(),
            config,
            store: RecordStore::new(),
            engine: QueryEngine::new(),
            state: IngestState::Idle,
            stats: IngestStats::default(),
            listeners: Vec::new(),
            next_listener_id: 0,
            dispatching: Vec::new(),
            removed_while_dispatching: Vec::new(),
        }
    }

    /// Create a parser for a format given by name, e.g. `APACHE_COMBINED`
    pub fn with_format(format: &str) -> Result<Self, ConfigError> {
        let format: LogFormat = format.parse()?;
        Ok(Self::new(ParserConfig {
            format,
            ..ParserConfig::default()
        }))
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn format(&self) -> LogFormat {
        self.config.format
    }

    /// Every record parsed so far, across all ingestion runs
    pub fn logs(&self) -> &RecordStore {
        &self.store
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Totals across all ingestion runs
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Begin a query over the current records
    pub fn start(&mut self) -> &mut QueryEngine {
        self.engine.start(&self.store)
    }

    /// Query engine as left by the previous chain; fails until `start()` is called
    pub fn query(&mut self) -> &mut QueryEngine {
        &mut self.engine
    }

    /// Subscribe to an event. The listener runs once per completed ingestion run.
    pub fn on<F>(&mut self, event: ParserEvent, listener: F) -> ListenerId
    where
        F: FnMut(&mut LogParser) + 'static,
    {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, event, Box::new(listener)));
        id
    }

    /// Unsubscribe a listener. Returns false if it was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _, _)| *listener_id != id);
        if self.listeners.len() != before {
            return true;
        }
        // listeners are detached while an event is being dispatched
        let in_dispatch = self.dispatching.iter().any(|ids| ids.contains(&id));
        if in_dispatch && !self.removed_while_dispatching.contains(&id) {
            self.removed_while_dispatching.push(id);
            return true;
        }
        false
    }

    /// Read and parse a log file, appending its records to the store.
    ///
    /// Fails up front if the file cannot be opened or its first block cannot be
    /// read; nothing changes in that case.
    pub fn read<P: AsRef<Path>>(&mut self, path: P) -> Result<IngestStats, IngestError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let unreadable = |source| IngestError::SourceUnreadable {
            path: name.clone(),
            source,
        };
        let file = File::open(path).map_err(unreadable)?;
        let mut reader = BufReader::with_capacity(self.config.buffer_size, file);
        // opening a directory succeeds, the first read does not
        reader.fill_buf().map_err(unreadable)?;
        self.ingest(reader, Some(&name))
    }

    /// Parse every line of `input`, appending matching lines to the store,
    /// then notify `Data` listeners exactly once.
    pub fn ingest<R: BufRead>(
        &mut self,
        mut input: R,
        source: Option<&str>,
    ) -> Result<IngestStats, IngestError> {
        let start_time = Instant::now();
        self.state = IngestState::Ingesting;
        debug!(source = source.unwrap_or("<stream>"), "loggio: ingestion started");

        let mut run_stats = IngestStats {
            source: source.map(|s| s.to_string()),
            ..IngestStats::default()
        };
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            match input.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    run_stats.errors += 1;
                    match self.config.error_strategy {
                        ErrorStrategy::FailFast => {
                            self.finish_run(&mut run_stats, start_time);
                            self.state = IngestState::Idle;
                            return Err(IngestError::Io(e));
                        }
                        ErrorStrategy::Skip => {
                            warn!(line = run_stats.lines_seen + 1, error = %e, "loggio: read failed, stopping early");
                            break;
                        }
                    }
                }
            }

            for line in split_lines(&buffer) {
                if let Err(e) = self.process_line(line, &mut run_stats) {
                    self.finish_run(&mut run_stats, start_time);
                    self.state = IngestState::Idle;
                    return Err(e);
                }
            }
        }

        self.finish_run(&mut run_stats, start_time);
        self.state = IngestState::Completed;
        info!(
            source = source.unwrap_or("<stream>"),
            lines = run_stats.lines_seen,
            records = run_stats.records_parsed,
            unmatched = run_stats.lines_unmatched,
            elapsed_ms = run_stats.processing_time.as_millis() as u64,
            "loggio: ingestion completed"
        );

        self.emit(ParserEvent::Data);
        Ok(run_stats)
    }

    fn process_line(&mut self, bytes: &[u8], run_stats: &mut IngestStats) -> Result<(), IngestError> {
        run_stats.lines_seen += 1;
        let line_number = run_stats.lines_seen;
        let line = String::from_utf8_lossy(bytes);

        if line.len() > self.config.max_line_length {
            run_stats.lines_too_long += 1;
            return match self.config.error_strategy {
                ErrorStrategy::FailFast => Err(IngestError::LineTooLong {
                    line_number,
                    length: line.len(),
                    max_length: self.config.max_line_length,
                }),
                ErrorStrategy::Skip => {
                    warn!(line = line_number, length = line.len(), "loggio: line too long, skipping");
                    Ok(())
                }
            };
        }

        match self.line_parser.parse_line(&line) {
            Some(record) => {
                run_stats.update_with_record(&record);
                self.store.push(record);
            }
            None => {
                run_stats.lines_unmatched += 1;
                debug!(line = line_number, format = %self.config.format, "loggio: line does not match format");
            }
        }
        Ok(())
    }

    fn finish_run(&mut self, run_stats: &mut IngestStats, start_time: Instant) {
        run_stats.processing_time = start_time.elapsed();
        self.stats.merge(run_stats);
    }

    fn emit(&mut self, event: ParserEvent) {
        let mut listeners = std::mem::take(&mut self.listeners);
        // a listener may ingest again, so dispatches nest
        self.dispatching
            .push(listeners.iter().map(|(id, _, _)| *id).collect());

        for (id, listener_event, listener) in listeners.iter_mut() {
            if *listener_event != event || self.removed_while_dispatching.contains(id) {
                continue;
            }
            listener(self);
        }

        let frame = self.dispatching.pop().unwrap_or_default();
        let removed = &self.removed_while_dispatching;
        listeners.retain(|(id, _, _)| !removed.contains(id));
        self.removed_while_dispatching
            .retain(|id| !frame.contains(id));
        // listeners registered during dispatch go after the existing ones
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

/// Split one `read_until` chunk into lines. `\n`, `\r\n` and a lone `\r` all
/// end a line.
fn split_lines(chunk: &[u8]) -> impl Iterator<Item = &[u8]> {
    let chunk = chunk.strip_suffix(b"\n").unwrap_or(chunk);
    let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
    chunk.split(|byte| *byte == b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    const LINE: &str = r#"168.41.191.9 - - [09/Jul/2018:10:10:38 +0200] "GET /most-visited HTTP/1.1" 200 3574 "-" "curl/7.58.0""#;

    #[test]
    fn test_split_lines() {
        let lines = |chunk: &'static [u8]| split_lines(chunk).collect::<Vec<&[u8]>>();
        assert_eq!(lines(b"abc\r\n"), vec![b"abc" as &[u8]]);
        assert_eq!(lines(b"abc\n"), vec![b"abc" as &[u8]]);
        assert_eq!(lines(b"abc"), vec![b"abc" as &[u8]]);
        assert_eq!(lines(b"abc\rdef\r"), vec![b"abc" as &[u8], b"def"]);
        assert_eq!(lines(b"\n"), vec![b"" as &[u8]]);
    }

    #[test]
    fn test_state_transitions() {
        let mut parser = LogParser::default();
        assert_eq!(parser.state(), IngestState::Idle);
        parser.ingest(Cursor::new(LINE), None).unwrap();
        assert_eq!(parser.state(), IngestState::Completed);
    }

    #[test]
    fn test_listener_removed_during_dispatch() {
        let mut parser = LogParser::default();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let second_id = Rc::new(RefCell::new(None));
        let log = calls.clone();
        let target = second_id.clone();
        parser.on(ParserEvent::Data, move |p| {
            log.borrow_mut().push("first");
            if let Some(id) = target.borrow_mut().take() {
                assert!(p.off(id));
            }
        });
        let log = calls.clone();
        let id = parser.on(ParserEvent::Data, move |_| log.borrow_mut().push("second"));
        *second_id.borrow_mut() = Some(id);

        parser.ingest(Cursor::new(LINE), None).unwrap();
        parser.ingest(Cursor::new(LINE), None).unwrap();

        assert_eq!(*calls.borrow(), vec!["first", "first"]);
        assert!(!parser.off(id));
    }

    #[test]
    fn test_listener_removed_after_nested_ingest() {
        let mut parser = LogParser::default();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let second_id = Rc::new(RefCell::new(None));
        let log = calls.clone();
        let target = second_id.clone();
        parser.on(ParserEvent::Data, move |p| {
            log.borrow_mut().push("first");
            let pending = target.borrow_mut().take();
            if let Some(id) = pending {
                p.ingest(Cursor::new(LINE), None).unwrap();
                assert!(p.off(id));
            }
        });
        let log = calls.clone();
        let id = parser.on(ParserEvent::Data, move |_| log.borrow_mut().push("second"));
        *second_id.borrow_mut() = Some(id);

        parser.ingest(Cursor::new(LINE), None).unwrap();
        parser.ingest(Cursor::new(LINE), None).unwrap();

        assert_eq!(*calls.borrow(), vec!["first", "first"]);
        assert_eq!(parser.logs().len(), 3);
        assert!(!parser.off(id));
    }

    #[test]
    fn test_listener_added_during_dispatch_runs_next_time() {
        let mut parser = LogParser::default();
        let calls = Rc::new(RefCell::new(0));

        let counter = calls.clone();
        parser.on(ParserEvent::Data, move |p| {
            let counter = counter.clone();
            if p.stats().records_parsed == 1 {
                p.on(ParserEvent::Data, move |_| *counter.borrow_mut() += 1);
            }
        });

        parser.ingest(Cursor::new(LINE), None).unwrap();
        assert_eq!(*calls.borrow(), 0);
        parser.ingest(Cursor::new(LINE), None).unwrap();
        assert_eq!(*calls.borrow(), 1);
    }
}
