//! A tiny [`log::Log`] backend writing to stderr.
//!
//! The tool lives inside someone else's process, so it stays silent unless
//! `RUST_LOG` asks for output.

use std::{
    env,
    io::{self, Write},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{LevelFilter, Metadata, Record};

use crate::Error;

/// The environment variable holding the log level
pub const LOG_LEVEL_ENV: &str = "RUST_LOG";

/// The global stderr logger instance
pub static BBTRACE_STDERR_LOGGER: SimpleStderrLogger = SimpleStderrLogger::new();

/// A simple logger struct that logs to stderr when used with [`log::set_logger`].
#[derive(Debug)]
pub struct SimpleStderrLogger {}

impl Default for SimpleStderrLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleStderrLogger {
    /// Create a new [`log::Log`] logger that will write log to stderr
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// register stderr logger
    pub fn set_logger() -> Result<(), Error> {
        log::set_logger(&BBTRACE_STDERR_LOGGER)
            .map_err(|_| Error::illegal_state("Failed to register logger"))
    }

    /// Register the logger and take the max level from `RUST_LOG`.
    ///
    /// The variable belongs to the traced program as much as to us, so a value
    /// we do not understand means `off`. A logger registered earlier is kept.
    pub fn init_from_env() {
        let level = env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|value| parse_level(&value).ok())
            .unwrap_or(LevelFilter::Off);
        if Self::set_logger().is_ok() {
            log::set_max_level(level);
        }
    }
}

impl log::Log for SimpleStderrLogger {
    #[inline]
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        // Logging must never take the target down.
        let _ = writeln!(
            io::stderr(),
            "[{}.{:03}] {} {}: {}",
            now.as_secs(),
            now.subsec_millis(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Parse a `RUST_LOG`-style level name.
pub fn parse_level(value: &str) -> Result<LevelFilter, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "off" => Ok(LevelFilter::Off),
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        _ => Err(Error::illegal_argument(format!(
            "Unknown {LOG_LEVEL_ENV} level: {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use log::LevelFilter;

    use super::parse_level;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("TRACE").unwrap(), LevelFilter::Trace);
        assert_eq!(parse_level(" warn ").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("").unwrap(), LevelFilter::Off);
    }

    #[test]
    fn unknown_level_is_rejected() {
        assert!(parse_level("verbose").is_err());
    }
}
