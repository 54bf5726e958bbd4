//! Logging setup for bizobj
//!
//! Library code only emits `tracing` events. Binaries and tests that want
//! to see them call [`init`] once:
//! - Minimum log level configuration
//! - stderr or file output
//! - Error cause-chain formatting
//! - Lightweight performance timing helper

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, Level};

use crate::config::LogSettings;

/// Log levels understood by the configuration layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    /// Parse log level from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "TRACE" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// The matching `tracing` level
    pub fn as_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Logging configuration options
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Whether to print to stderr (ignored when `file` is set)
    pub print: bool,
    /// Write to this file instead of stderr
    pub file: Option<PathBuf>,
    /// Minimum log level (defaults to INFO)
    pub level: Option<LogLevel>,
}

impl From<&LogSettings> for LogOptions {
    fn from(settings: &LogSettings) -> Self {
        Self {
            print: settings.print,
            file: settings.file.clone(),
            level: LogLevel::from_str(&settings.level),
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed (tests often
/// race on this), `Ok(true)` when this call installed it.
pub fn init(options: LogOptions) -> std::io::Result<bool> {
    let level = options.level.unwrap_or(LogLevel::Info).as_tracing_level();

    let installed = match options.file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    fs::create_dir_all(dir)?;
                }
            }
            let file = File::options().create(true).append(true).open(&path)?;
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .is_ok()
        }
        None if options.print => tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok(),
        None => false,
    };

    if installed {
        debug!(level = %level, "logging initialized");
    }
    Ok(installed)
}

/// Performance timing helper, logs the elapsed time when dropped
pub struct Timer {
    message: String,
    start: Instant,
}

impl Timer {
    /// Start a timer for an operation
    pub fn start(message: impl Into<String>) -> Self {
        let message = message.into();
        debug!(status = "started", "{}", message);
        Self {
            message,
            start: Instant::now(),
        }
    }

    /// Stop the timer and log duration
    pub fn stop(self) {
        // Logged on drop
    }

    /// Elapsed milliseconds so far
    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            status = "completed",
            duration_ms = self.start.elapsed().as_millis() as u64,
            "{}",
            self.message
        );
    }
}

/// Render an error and its `source()` chain on one line
pub fn format_error(error: &dyn std::error::Error) -> String {
    const MAX_DEPTH: usize = 10;

    std::iter::successors(Some(error), |e| e.source())
        .take(MAX_DEPTH)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
