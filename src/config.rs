//! Dispatcher configuration.
//!
//! Values are read once from a [`ConfigSource`]: the process environment,
//! a plain key/value map, or a TOML file. Invalid values fall back to
//! defaults without crashing.
//!
//! # Keys
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TASKPOLL_QUEUE_CAPACITY` | 200 | Max concurrently pending long-polls |
//! | `TASKPOLL_MAX_REQUEST_TIMEOUT_MS` | 1800000 | Ceiling on a request's response timeout |
//! | `TASKPOLL_FETCH_INTERVAL_MS` | 30000 | Max sleep while anything is pending |
//! | `TASKPOLL_UNIQUE_WORKER_REQUEST` | false | Cancel older requests of the same worker |
//! | `TASKPOLL_LOG_LEVEL` | info | Log filter directive |
//! | `TASKPOLL_LOG_FORMAT` | json | `json` or `pretty` |
//! | `TASKPOLL_LOG_FILE` | (stderr) | Write logs to this file instead |
//!
//! A TOML file uses the same keys without the `TASKPOLL_` prefix, in lower
//! case (`queue_capacity = 50`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::telemetry::{LogConfig, LogFormat};

pub const DEFAULT_QUEUE_CAPACITY: usize = 200;
pub const DEFAULT_MAX_REQUEST_TIMEOUT_MS: u64 = 1_800_000;
pub const DEFAULT_FETCH_INTERVAL_MS: u64 = 30_000;

pub const QUEUE_CAPACITY_KEY: &str = "TASKPOLL_QUEUE_CAPACITY";
pub const MAX_REQUEST_TIMEOUT_KEY: &str = "TASKPOLL_MAX_REQUEST_TIMEOUT_MS";
pub const FETCH_INTERVAL_KEY: &str = "TASKPOLL_FETCH_INTERVAL_MS";
pub const UNIQUE_WORKER_KEY: &str = "TASKPOLL_UNIQUE_WORKER_REQUEST";
pub const LOG_LEVEL_KEY: &str = "TASKPOLL_LOG_LEVEL";
pub const LOG_FORMAT_KEY: &str = "TASKPOLL_LOG_FORMAT";
pub const LOG_FILE_KEY: &str = "TASKPOLL_LOG_FILE";

const KEY_PREFIX: &str = "TASKPOLL_";

/// Errors reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Lookup of raw configuration values by their `TASKPOLL_*` name.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Flat TOML table of settings.
#[derive(Debug, Clone, Default)]
pub struct TomlSource {
    values: HashMap<String, String>,
}

impl FromStr for TomlSource {
    type Err = ConfigError;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let table: toml::Table = toml::from_str(contents)?;
        let values = table
            .into_iter()
            .map(|(key, value)| {
                let raw = match value {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key.to_ascii_lowercase(), raw)
            })
            .collect();
        Ok(Self { values })
    }
}

impl TomlSource {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse()
    }
}

impl ConfigSource for TomlSource {
    fn get(&self, key: &str) -> Option<String> {
        let short = key.strip_prefix(KEY_PREFIX).unwrap_or(key);
        self.values.get(&short.to_ascii_lowercase()).cloned()
    }
}

/// Settings the dispatcher reads at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
    pub max_request_timeout_ms: u64,
    pub fetch_interval: Duration,
    pub unique_worker_request: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_request_timeout_ms: DEFAULT_MAX_REQUEST_TIMEOUT_MS,
            fetch_interval: Duration::from_millis(DEFAULT_FETCH_INTERVAL_MS),
            unique_worker_request: false,
        }
    }
}

impl DispatchConfig {
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> Self {
        let queue_capacity = parse_positive(source, QUEUE_CAPACITY_KEY)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);
        let max_request_timeout_ms =
            parse_positive(source, MAX_REQUEST_TIMEOUT_KEY).unwrap_or(DEFAULT_MAX_REQUEST_TIMEOUT_MS);
        let fetch_interval_ms =
            parse_positive(source, FETCH_INTERVAL_KEY).unwrap_or(DEFAULT_FETCH_INTERVAL_MS);

        Self {
            queue_capacity,
            max_request_timeout_ms,
            fetch_interval: Duration::from_millis(fetch_interval_ms),
            unique_worker_request: parse_flag(source, UNIQUE_WORKER_KEY),
        }
    }
}

/// Everything the binary needs at startup.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub dispatch: DispatchConfig,
    pub log: LogConfig,
}

/// Printable summary of effective values.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub queue_capacity: usize,
    pub max_request_timeout_ms: u64,
    pub fetch_interval_ms: u64,
    pub unique_worker_request: bool,
    pub log_level: String,
    pub log_format: String,
    pub log_file: Option<PathBuf>,
}

/// Parse a strictly positive integer; anything else is treated as absent.
fn parse_positive<S: ConfigSource + ?Sized>(source: &S, key: &str) -> Option<u64> {
    source
        .get(key)
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}

fn parse_flag<S: ConfigSource + ?Sized>(source: &S, key: &str) -> bool {
    source
        .get(key)
        .map(|raw| raw.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn load_log_config<S: ConfigSource + ?Sized>(source: &S) -> LogConfig {
    let defaults = LogConfig::default();
    let level = source
        .get(LOG_LEVEL_KEY)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .unwrap_or(defaults.level);
    let format = source
        .get(LOG_FORMAT_KEY)
        .and_then(|raw| LogFormat::parse(&raw))
        .unwrap_or(defaults.format);
    let output_path = source
        .get(LOG_FILE_KEY)
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from);
    LogConfig { format, level, output_path }
}

/// Load from any source.
pub fn load_from<S: ConfigSource + ?Sized>(source: &S) -> EnvConfig {
    EnvConfig {
        dispatch: DispatchConfig::from_source(source),
        log: load_log_config(source),
    }
}

/// Load from the process environment.
pub fn load() -> EnvConfig {
    load_from(&EnvSource)
}

/// Keys present in `source` whose values were rejected and replaced by
/// their default.
pub fn invalid_keys<S: ConfigSource + ?Sized>(source: &S) -> Vec<&'static str> {
    let mut invalid = Vec::new();
    for key in [QUEUE_CAPACITY_KEY, MAX_REQUEST_TIMEOUT_KEY, FETCH_INTERVAL_KEY] {
        if source.get(key).is_some() && parse_positive(source, key).is_none() {
            invalid.push(key);
        }
    }
    if let Some(raw) = source.get(LOG_FORMAT_KEY) {
        if LogFormat::parse(&raw).is_none() {
            invalid.push(LOG_FORMAT_KEY);
        }
    }
    invalid
}

impl EnvConfig {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            queue_capacity: self.dispatch.queue_capacity,
            max_request_timeout_ms: self.dispatch.max_request_timeout_ms,
            fetch_interval_ms: u64::try_from(self.dispatch.fetch_interval.as_millis())
                .unwrap_or(u64::MAX),
            unique_worker_request: self.dispatch.unique_worker_request,
            log_level: self.log.level.clone(),
            log_format: self.log.format.as_str().to_string(),
            log_file: self.log.output_path.clone(),
        }
    }
}
