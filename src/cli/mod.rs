//! CLI module for stackshift.
//!
//! This module provides the command-line interface for detecting and
//! deploying stack changes.

mod commands;
mod output;

pub use commands::{ChangeArgs, Cli, Commands, LogFormat, OutputFormat, RunArgs};
pub use output::OutputFormatter;
