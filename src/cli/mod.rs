// Copyright 2024-2026 evalgate Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for the `evalgate-cli` binary.
//!
//! ## Usage
//!
//! ```bash
//! evalgate-cli simulate --requests 200   # Drive a synthetic evaluator
//! evalgate-cli config show               # Effective configuration
//! evalgate-cli config validate cfg.toml  # Check a config file
//! ```

pub mod config_cmd;
pub mod simulate;

pub use simulate::{run_simulate, SimulateArgs};
