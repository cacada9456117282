// Copyright 2024-2026 taskpoll Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for taskpoll commands.
//!
//! ## Usage
//!
//! ```bash
//! taskpoll-cli demo                  # Run long-polling workers against an in-memory store
//! taskpoll-cli config show           # Print effective configuration
//! taskpoll-cli config validate       # Check configuration, exit 1 on warnings
//! ```

pub mod config_cmd;
pub mod demo;

pub use demo::{run_demo, DemoOptions};

/// Value following `name` in `args`, if any.
pub fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
