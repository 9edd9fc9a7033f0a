//! Structured conversion report
//!
//! The library never writes to a user-facing surface. Everything worth telling
//! the host is recorded here as a [LogLine], and forwarded to the `log` facade
//! so that an installed logger sees the same lines.

use log::{Level, log};

/// A single diagnostic line produced during a conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,

    /// The content document the line refers to, if any
    pub document: Option<String>,

    pub message: String,
}

/// Outcome counters and log lines of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub lines: Vec<LogLine>,

    /// Content documents that went through the pipeline without error
    pub documents_processed: usize,

    /// Content documents skipped in best-effort mode
    pub skipped: Vec<String>,

    pub spans_added: usize,
    pub markers_removed: usize,

    /// Container paths of resources added by the pipeline
    pub added_resources: Vec<String>,

    /// Content documents in the order they were visited
    pub visited: Vec<String>,
}

impl ConversionReport {
    /// Records a line and forwards it to the `log` facade
    pub fn log(&mut self, level: Level, document: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        match document {
            Some(document) => log!(level, "[{document}] {message}"),
            None => log!(level, "{message}"),
        }

        self.lines.push(LogLine {
            level,
            document: document.map(str::to_string),
            message,
        });
    }

    pub fn debug(&mut self, document: Option<&str>, message: impl Into<String>) {
        self.log(Level::Debug, document, message);
    }

    pub fn info(&mut self, document: Option<&str>, message: impl Into<String>) {
        self.log(Level::Info, document, message);
    }

    pub fn warn(&mut self, document: Option<&str>, message: impl Into<String>) {
        self.log(Level::Warn, document, message);
    }

    pub fn error(&mut self, document: Option<&str>, message: impl Into<String>) {
        self.log(Level::Error, document, message);
    }

    /// Lines at `level` or more severe
    pub fn lines_at(&self, level: Level) -> impl Iterator<Item = &LogLine> {
        self.lines.iter().filter(move |line| line.level <= level)
    }
}
