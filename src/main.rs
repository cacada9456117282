// Copyright 2024-2026 taskpoll Contributors
// SPDX-License-Identifier: Apache-2.0

//! taskpoll command line entry point.
//!
//! ## Subcommands
//!
//! - `taskpoll-cli demo` - Run workers against an in-memory store
//! - `taskpoll-cli config show|defaults|validate` - Inspect configuration
//! - `taskpoll-cli version` - Print version

use std::path::Path;
use std::process::ExitCode;

use taskpoll_core::cli::{config_cmd, flag_value, run_demo, DemoOptions};
use taskpoll_core::config;
use taskpoll_core::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(|s| s.as_str()).unwrap_or("help");

    match command {
        "demo" => {
            let env = config::load();
            if let Err(e) = init_logging(&env.log) {
                eprintln!("Logging setup failed: {}", e);
                return ExitCode::from(2u8);
            }
            let code = run_demo(DemoOptions::from_args(&args), env.dispatch).await;
            exit_code(code)
        }
        "config" => {
            let subcommand = args.get(1).map(|s| s.as_str()).unwrap_or("show");
            let file = flag_value(&args, "--file").map(Path::new);
            match subcommand {
                "show" => exit_code(config_cmd::run_show(file)),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit_code(config_cmd::run_validate(file)),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "version" | "--version" | "-V" => {
            println!("taskpoll {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "taskpoll - long-poll task dispatch v{version}

USAGE:
    taskpoll-cli <COMMAND> [OPTIONS]

COMMANDS:
    demo         Run long-polling workers against an in-memory task store
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

DEMO OPTIONS:
    --workers N    Number of workers (default 3)
    --tasks N      Number of tasks to produce (default 6)
    --timeout MS   Worker response timeout (default 2000)
    --delay MS     Delay between produced tasks (default 250)

CONFIG OPTIONS:
    --file PATH    Read settings from a TOML file instead of the environment

ENVIRONMENT:
    TASKPOLL_QUEUE_CAPACITY          Max pending long-polls (default 200)
    TASKPOLL_MAX_REQUEST_TIMEOUT_MS  Max response timeout (default 1800000)
    TASKPOLL_FETCH_INTERVAL_MS       Re-poll interval while pending (default 30000)
    TASKPOLL_UNIQUE_WORKER_REQUEST   Cancel older requests per worker (default false)
    TASKPOLL_LOG_LEVEL               Log filter (default info)
    TASKPOLL_LOG_FORMAT              json or pretty (default json)
    TASKPOLL_LOG_FILE                Log file (default stderr)

EXIT CODES:
    0  Success
    1  Failure / validation warnings
    2  Configuration error"
    );
}
