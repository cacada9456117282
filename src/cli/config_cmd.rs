// Copyright 2024-2026 taskpoll Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! Settings come from the environment, or from a TOML file when
//! `--file PATH` is given.

use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::config::{
    self, ConfigSource, EffectiveConfig, EnvSource, TomlSource, DEFAULT_FETCH_INTERVAL_MS,
    DEFAULT_MAX_REQUEST_TIMEOUT_MS, DEFAULT_QUEUE_CAPACITY, FETCH_INTERVAL_KEY, LOG_FILE_KEY,
    LOG_FORMAT_KEY, LOG_LEVEL_KEY, MAX_REQUEST_TIMEOUT_KEY, QUEUE_CAPACITY_KEY, UNIQUE_WORKER_KEY,
};

/// Exit code for an unreadable config file.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Print effective config as key-value pairs to stdout.
pub fn run_show(file: Option<&Path>) -> i32 {
    with_source(file, |source| {
        print_config(&config::load_from(source).effective_config());
        0
    })
}

/// Print default values (no overrides) to stdout.
pub fn run_defaults() {
    println!("{QUEUE_CAPACITY_KEY}={DEFAULT_QUEUE_CAPACITY}");
    println!("{MAX_REQUEST_TIMEOUT_KEY}={DEFAULT_MAX_REQUEST_TIMEOUT_MS}");
    println!("{FETCH_INTERVAL_KEY}={DEFAULT_FETCH_INTERVAL_MS}");
    println!("{UNIQUE_WORKER_KEY}=false");
    println!("{LOG_LEVEL_KEY}=info");
    println!("{LOG_FORMAT_KEY}=json");
    println!("{LOG_FILE_KEY}=");
}

/// Validate configuration. Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate(file: Option<&Path>) -> i32 {
    with_source(file, |source| {
        let warnings = validate(source);
        for warning in &warnings {
            eprintln!("WARNING: {warning}");
        }
        if warnings.is_empty() {
            println!("Configuration is valid.");
            0
        } else {
            1
        }
    })
}

/// Misconfigurations that do not prevent startup but are likely mistakes.
pub fn validate<S: ConfigSource + ?Sized>(source: &S) -> Vec<String> {
    let mut warnings: Vec<String> = config::invalid_keys(source)
        .into_iter()
        .map(|key| format!("{key} has an invalid value; the default is used"))
        .collect();

    let cfg = config::load_from(source);
    let fetch_interval_ms = cfg.effective_config().fetch_interval_ms;
    if fetch_interval_ms > cfg.dispatch.max_request_timeout_ms {
        warnings.push(format!(
            "{FETCH_INTERVAL_KEY} ({fetch_interval_ms}) exceeds {MAX_REQUEST_TIMEOUT_KEY} ({}); \
             pending requests are never re-polled before they time out",
            cfg.dispatch.max_request_timeout_ms
        ));
    }

    if let Err(e) = EnvFilter::try_new(&cfg.log.level) {
        warnings.push(format!("{LOG_LEVEL_KEY} is not a valid filter: {e}"));
    }

    warnings
}

fn with_source(file: Option<&Path>, run: impl FnOnce(&dyn ConfigSource) -> i32) -> i32 {
    match file {
        None => run(&EnvSource),
        Some(path) => match TomlSource::from_path(path) {
            Ok(source) => run(&source),
            Err(e) => {
                eprintln!("Error: {e}");
                EXIT_CONFIG_ERROR
            }
        },
    }
}

fn print_config(cfg: &EffectiveConfig) {
    println!("{QUEUE_CAPACITY_KEY}={}", cfg.queue_capacity);
    println!("{MAX_REQUEST_TIMEOUT_KEY}={}", cfg.max_request_timeout_ms);
    println!("{FETCH_INTERVAL_KEY}={}", cfg.fetch_interval_ms);
    println!("{UNIQUE_WORKER_KEY}={}", cfg.unique_worker_request);
    println!("{LOG_LEVEL_KEY}={}", cfg.log_level);
    println!("{LOG_FORMAT_KEY}={}", cfg.log_format);
    println!(
        "{LOG_FILE_KEY}={}",
        cfg.log_file.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
    );
}
