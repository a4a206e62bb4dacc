use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::PingError;

/// Where operator-facing status lines go.
///
/// A reporter is built once at startup and handed to the session; nothing in
/// the crate writes status lines anywhere else.
pub trait Reporter {
    /// Progress the operator asked to see: replies, timeouts.
    fn info(&mut self, line: &str);
    /// Low-visibility detail: ignored messages, malformed datagrams.
    fn diagnostic(&mut self, line: &str);
    /// The error that ended the session.
    fn fatal(&mut self, err: &PingError);
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn info(&mut self, line: &str) {
        (**self).info(line)
    }

    fn diagnostic(&mut self, line: &str) {
        (**self).diagnostic(line)
    }

    fn fatal(&mut self, err: &PingError) {
        (**self).fatal(err)
    }
}

/// Emits every line as a `tracing` event: info, debug and error respectively.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&mut self, line: &str) {
        info!("{}", line);
    }

    fn diagnostic(&mut self, line: &str) {
        debug!("{}", line);
    }

    fn fatal(&mut self, err: &PingError) {
        error!("{}", err);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Diagnostic,
    Fatal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub level: Level,
    pub line: String,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Keeps every report in memory. Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct MemoryReporter {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Lines reported at `level`, oldest first.
    pub fn lines(&self, level: Level) -> Vec<String> {
        self.reports
            .lock()
            .iter()
            .filter(|report| report.level == level)
            .map(|report| report.line.clone())
            .collect()
    }

    fn push(&self, level: Level, line: String) {
        self.reports.lock().push(Report { level, line });
    }
}

impl Reporter for MemoryReporter {
    fn info(&mut self, line: &str) {
        self.push(Level::Info, line.to_string());
    }

    fn diagnostic(&mut self, line: &str) {
        self.push(Level::Diagnostic, line.to_string());
    }

    fn fatal(&mut self, err: &PingError) {
        self.push(Level::Fatal, err.to_string());
    }
}
