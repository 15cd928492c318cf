//! Pluggable log sink for session-level messages.
//!
//! Transport and identity internals log through `tracing` directly; the
//! lines a host application sees about its session go through `Logger`.

use std::sync::{Mutex, PoisonError};

use tracing::Level;

/// Four-level log sink supplied by the host application.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Discards everything. The default when no logger is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Forwards to `tracing` under the `cogniot` target.
///
/// Opt in with `SessionConfig::with_logger`; unset loggers resolve to
/// `NullLogger`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "cogniot", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "cogniot", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "cogniot", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "cogniot", "{message}");
    }
}

/// A captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
}

/// Keeps every log line in memory for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, level: Level, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                level,
                message: message.to_string(),
            });
    }

    /// All captured lines in order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages logged at `level`, in order.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str) {
        self.record(Level::DEBUG, message);
    }

    fn info(&self, message: &str) {
        self.record(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.record(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.record(Level::ERROR, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_logger_keeps_levels_and_order() {
        let logger = RecordingLogger::new();
        logger.info("one");
        logger.error("two");
        logger.info("three");

        assert_eq!(logger.entries().len(), 3);
        assert_eq!(logger.messages_at(Level::INFO), vec!["one", "three"]);
        assert_eq!(logger.messages_at(Level::ERROR), vec!["two"]);
        assert!(logger.messages_at(Level::DEBUG).is_empty());

        logger.clear();
        assert!(logger.entries().is_empty());
    }

    #[test]
    fn null_and_tracing_loggers_accept_everything() {
        let sinks: [&dyn Logger; 2] = [&NullLogger, &TracingLogger];
        for sink in sinks {
            sink.debug("d");
            sink.info("i");
            sink.warn("w");
            sink.error("e");
        }
    }
}
