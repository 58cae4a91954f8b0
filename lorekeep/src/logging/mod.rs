//! Structured logging for Lorekeep.
//!
//! Installs a global `tracing` subscriber from [`LoggingConfig`]. `RUST_LOG`
//! takes precedence over the configured level when set.


use crate::config::{LogFormat, LogLevel, LoggingConfig};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Keeps the file writer flushing for the life of the process.
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Error type for logging operations
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// IO error occurred
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing log level
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Error in subscriber setup
    #[error("Subscriber error: {0}")]
    SubscriberError(Box<dyn std::error::Error + Send + Sync>),

    /// General error
    #[error("{0}")]
    Other(String),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for LogError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        LogError::SubscriberError(err)
    }
}

/// Result type for logging operations
pub type Result<T> = std::result::Result<T, LogError>;

/// Initialize the logging system with the given configuration.
///
/// A no-op when a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let writer = make_writer(config)?;

    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_writer(writer)
            .try_init()?,
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(writer)
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_writer(writer)
            .try_init()?,
        LogFormat::Default => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(writer)
            .try_init()?,
    }

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

/// Stdout, the configured file, both, or neither.
fn make_writer(config: &LoggingConfig) -> Result<BoxMakeWriter> {
    let file = match &config.file {
        Some(path) => {
            let (writer, guard) = create_non_blocking_file(path)?;
            let mut slot = FILE_GUARD
                .lock()
                .map_err(|_| LogError::Other("log file guard poisoned".to_string()))?;
            *slot = Some(guard);
            Some(writer)
        }
        None => None,
    };

    Ok(match (file, config.stdout) {
        (Some(file), true) => BoxMakeWriter::new(std::io::stdout.and(file)),
        (Some(file), false) => BoxMakeWriter::new(file),
        (None, true) => BoxMakeWriter::new(std::io::stdout),
        (None, false) => BoxMakeWriter::new(std::io::sink),
    })
}

/// Create a non-blocking file writer.
fn create_non_blocking_file(path: impl AsRef<Path>) -> Result<(NonBlocking, WorkerGuard)> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| LogError::Other(format!("log file path has no file name: {}", path.display())))?;

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !directory.exists() {
        std::fs::create_dir_all(directory)?;
    }

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    Ok(tracing_appender::non_blocking(file_appender))
}

/// Parse a log level string into a LogLevel enum.
pub fn parse_log_level(level: &str) -> Result<LogLevel> {
    level.parse().map_err(|_| LogError::InvalidLogLevel(level.to_string()))
}

/// Convert a tracing::Level to a LogLevel enum.
pub fn level_to_log_level(level: Level) -> LogLevel {
    match level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

/// Log an error value together with structured fields and a message.
///
/// ```rust
/// let err = std::io::Error::other("disk full");
/// lorekeep::log_error!(err, source_id = "turn-1", "Ingest failed");
/// ```
#[macro_export]
macro_rules! log_error {
    ($err:expr, $($arg:tt)+) => {
        tracing::error!(error = %$err, $($arg)+)
    };
}
