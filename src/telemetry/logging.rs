//! Logging setup for taskpoll.
//!
//! JSON or pretty output through `tracing-subscriber`, filtered by an
//! `EnvFilter` directive, written to stderr or a file.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging (default for production).
    #[default]
    Json,
    /// Human-readable pretty printing (for development).
    Pretty,
}

impl LogFormat {
    /// Case-insensitive `json` or `pretty`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive (e.g., "info", "taskpoll_core=trace").
    pub level: String,
    /// Log file. `None` logs to stderr.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;

    match (config.format, config.output_path.as_deref()) {
        (LogFormat::Json, path) => init_json_subscriber(filter, path),
        (LogFormat::Pretty, None) => init_pretty_subscriber(filter),
        (LogFormat::Pretty, Some(path)) => init_pretty_file_subscriber(filter, path),
    }
}

fn open_log_file(path: &Path) -> Result<std::sync::Mutex<std::fs::File>, LogError> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LogError::FileOpen(format!("{}: {}", path.display(), e)))?;
    Ok(std::sync::Mutex::new(file))
}

fn init_json_subscriber(filter: EnvFilter, path: Option<&Path>) -> Result<(), LogError> {
    let registry = tracing_subscriber::registry().with(filter);

    if let Some(path) = path {
        registry
            .with(fmt::layer().json().with_writer(open_log_file(path)?))
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;
    } else {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;
    }

    Ok(())
}

fn init_pretty_subscriber(filter: EnvFilter) -> Result<(), LogError> {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().pretty().with_writer(std::io::stderr))
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)?;
    Ok(())
}

fn init_pretty_file_subscriber(filter: EnvFilter, path: &Path) -> Result<(), LogError> {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(open_log_file(path)?))
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)?;
    Ok(())
}
