use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use log::{info, warn};

use crate::drivers::MonitorError;
use crate::types::{Sample, SeriesId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoggerState {
    Idle,
    Armed,
    Writing,
}

/// Answer to "the destination already exists, overwrite it?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverwritePolicy {
    Proceed,
    Abort,
}

/// Where a finished session's table goes. Written once per session.
pub trait LogSink {
    fn describe(&self) -> String;
    fn exists(&self) -> bool;
    fn write_table(&mut self, header: &[String], rows: &[Vec<String>]) -> io::Result<()>;
}

/// Comma-separated file, created (or truncated) when the session stops.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn write_table(&mut self, header: &[String], rows: &[Vec<String>]) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(&self.path)?);
        write_line(&mut w, header)?;
        for row in rows {
            write_line(&mut w, row)?;
        }
        w.flush()
    }
}

fn write_line(w: &mut impl Write, fields: &[String]) -> io::Result<()> {
    let line: Vec<String> = fields.iter().map(|f| escape(f)).collect();
    writeln!(w, "{}", line.join(","))
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    exists: bool,
    fail: bool,
    writes: usize,
    lines: Vec<String>,
}

/// In-memory sink. Clones share the same table so a test can keep a handle
/// after giving the sink to the logger.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    table: Rc<RefCell<MemoryTable>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the destination is already there.
    pub fn existing() -> Self {
        let sink = Self::default();
        sink.table.borrow_mut().exists = true;
        sink
    }

    pub fn set_failing(&self, fail: bool) {
        self.table.borrow_mut().fail = fail;
    }

    pub fn writes(&self) -> usize {
        self.table.borrow().writes
    }

    pub fn lines(&self) -> Vec<String> {
        self.table.borrow().lines.clone()
    }
}

impl LogSink for MemorySink {
    fn describe(&self) -> String {
        "memory".into()
    }

    fn exists(&self) -> bool {
        self.table.borrow().exists
    }

    fn write_table(&mut self, header: &[String], rows: &[Vec<String>]) -> io::Result<()> {
        let mut table = self.table.borrow_mut();
        if table.fail {
            return Err(io::Error::new(io::ErrorKind::Other, "sink unavailable"));
        }
        let mut buf = Vec::new();
        write_line(&mut buf, header)?;
        for row in rows {
            write_line(&mut buf, row)?;
        }
        table.lines = String::from_utf8_lossy(&buf).lines().map(str::to_owned).collect();
        table.exists = true;
        table.writes += 1;
        Ok(())
    }
}

/// One logged series: a `<label> Time` / `<label> Value` column pair.
#[derive(Clone, Debug, PartialEq)]
pub struct LogColumn {
    pub series: SeriesId,
    pub label: String,
}

/// Rows collected between arming a destination and stopping. The column set
/// is fixed when the session is armed.
pub struct LoggingSession {
    columns: Vec<LogColumn>,
    interval: Duration,
    origin: Duration,
    rows: Vec<Vec<Option<Sample>>>,
    sink: Box<dyn LogSink>,
    writing: bool,
}

impl LoggingSession {
    pub fn columns(&self) -> &[LogColumn] {
        &self.columns
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn header(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|c| [format!("{} Time", c.label), format!("{} Value", c.label)])
            .collect()
    }

    fn format_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .flat_map(|cell| match cell {
                        Some(sample) => {
                            let t = sample.timestamp.saturating_sub(self.origin);
                            let value = sample.value().map(|v| v.to_string()).unwrap_or_default();
                            [format!("{:.3}", t.as_secs_f64()), value]
                        }
                        None => [String::new(), String::new()],
                    })
                    .collect()
            })
            .collect()
    }
}

impl fmt::Debug for LoggingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingSession")
            .field("columns", &self.columns)
            .field("interval", &self.interval)
            .field("rows", &self.rows.len())
            .field("sink", &self.sink.describe())
            .field("writing", &self.writing)
            .finish()
    }
}

/// Start/stop logger. Idle -> Armed (destination and columns fixed) ->
/// Writing (one row per logging tick) -> Idle (table written exactly once).
#[derive(Debug, Default)]
pub struct DataLogger {
    session: Option<LoggingSession>,
}

impl DataLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LoggerState {
        match &self.session {
            None => LoggerState::Idle,
            Some(session) if session.writing => LoggerState::Writing,
            Some(_) => LoggerState::Armed,
        }
    }

    pub fn is_writing(&self) -> bool {
        self.state() == LoggerState::Writing
    }

    pub fn session(&self) -> Option<&LoggingSession> {
        self.session.as_ref()
    }

    /// Choose a destination and fix the columns. An armed session may be
    /// re-armed; a writing one may not. `origin` is the time logged as zero.
    pub fn arm(
        &mut self,
        columns: Vec<LogColumn>,
        interval: Duration,
        origin: Duration,
        sink: Box<dyn LogSink>,
    ) -> Result<(), MonitorError> {
        if self.is_writing() {
            return Err(MonitorError::LoggingConflict("a session is already writing"));
        }
        if columns.is_empty() {
            return Err(MonitorError::Config("nothing selected for logging".into()));
        }
        if interval.is_zero() {
            return Err(MonitorError::InvalidInterval("logger".into()));
        }
        info!(
            "logging armed: {} series every {} ms to {}",
            columns.len(),
            interval.as_millis(),
            sink.describe()
        );
        self.session = Some(LoggingSession {
            columns,
            interval,
            origin,
            rows: Vec::new(),
            sink,
            writing: false,
        });
        Ok(())
    }

    /// Resolve the overwrite question and start writing. Returns false when
    /// the caller declined to overwrite; the logger is then Idle again.
    pub fn begin(&mut self, policy: OverwritePolicy) -> Result<bool, MonitorError> {
        let session = match self.session.as_mut() {
            None => return Err(MonitorError::NotArmed),
            Some(session) if session.writing => {
                return Err(MonitorError::LoggingConflict("a session is already writing"))
            }
            Some(session) => session,
        };
        if session.sink.exists() && policy == OverwritePolicy::Abort {
            info!("{} exists, logging aborted", session.sink.describe());
            self.session = None;
            return Ok(false);
        }
        session.writing = true;
        info!("logging to {}", session.sink.describe());
        Ok(true)
    }

    /// Append one row, one cell per column in column order.
    pub fn record_row(&mut self, cells: Vec<Option<Sample>>) -> Result<(), MonitorError> {
        match self.session.as_mut() {
            Some(session) if session.writing => {
                if cells.len() != session.columns.len() {
                    return Err(MonitorError::Config(format!(
                        "row has {} cells, session has {} columns",
                        cells.len(),
                        session.columns.len()
                    )));
                }
                session.rows.push(cells);
                Ok(())
            }
            _ => Err(MonitorError::LoggingConflict("no session is writing")),
        }
    }

    /// End the session. Collected rows go to the destination exactly once;
    /// an empty session leaves the destination untouched. If the write fails
    /// the session keeps its rows and stays Writing.
    pub fn stop(&mut self) -> Result<usize, MonitorError> {
        let Some(session) = self.session.as_mut() else {
            return Err(MonitorError::LoggingConflict("no logging session is active"));
        };
        if !session.writing || session.rows.is_empty() {
            info!("logging stopped, nothing to save");
            self.session = None;
            return Ok(0);
        }
        let header = session.header();
        let rows = session.format_rows();
        if let Err(err) = session.sink.write_table(&header, &rows) {
            warn!("saving log to {} failed: {err}", session.sink.describe());
            return Err(err.into());
        }
        let saved = rows.len();
        info!("log saved: {saved} row(s) to {}", session.sink.describe());
        self.session = None;
        Ok(saved)
    }
}
