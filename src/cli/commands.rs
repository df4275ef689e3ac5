//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{BackendKind, DeployConfig};

/// Stackshift - Change-driven stack deployment.
#[derive(Parser, Debug)]
#[command(name = "stackshift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "STACKSHIFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text", alias = "output")]
    pub format: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the changes detected in the repository.
    Changes {
        /// Change detection options.
        #[command(flatten)]
        changes: ChangeArgs,
    },

    /// Show the dependency layers and the staged order of the changes.
    Plan {
        /// Change detection options.
        #[command(flatten)]
        changes: ChangeArgs,
    },

    /// Detect changes and apply them.
    Deploy {
        /// Change detection options.
        #[command(flatten)]
        changes: ChangeArgs,

        /// Execution options.
        #[command(flatten)]
        run: RunArgs,
    },

    /// Validate the configuration and the dependency graph.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },
}

/// Options controlling change detection.
#[derive(Args, Debug, Clone, Default)]
pub struct ChangeArgs {
    /// Repository to diff.
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Commit to diff HEAD against (defaults to HEAD^).
    #[arg(long)]
    pub commit: Option<String>,

    /// Only deploy paths matching this regular expression.
    #[arg(long)]
    pub filter: Option<String>,
}

impl ChangeArgs {
    /// Applies the flags that were given on top of `config`.
    ///
    /// A relative `--repo` is taken from the current directory, not from the
    /// configuration file's directory.
    pub fn apply(&self, config: &mut DeployConfig) {
        if let Some(repo) = &self.repo {
            config.changes.repo = std::env::current_dir().map_or_else(|_| repo.clone(), |cwd| cwd.join(repo));
        }
        if let Some(commit) = &self.commit {
            config.changes.base = Some(commit.clone());
        }
        if let Some(filter) = &self.filter {
            config.changes.filter = Some(filter.clone());
        }
    }
}

/// Options controlling how changes are applied.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Dispatch the operations of a class concurrently.
    #[arg(long, value_name = "BOOL")]
    pub parallel: Option<bool>,

    /// Stop at the first failure.
    #[arg(long, value_name = "BOOL")]
    pub exit_on_error: Option<bool>,

    /// Maximum operations in flight in parallel mode.
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Per-operation timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Order operations by the dependency graph.
    #[arg(long)]
    pub staged: bool,

    /// Report what would be done without calling the backend.
    #[arg(long)]
    pub dry_run: bool,

    /// AWS region.
    #[arg(long)]
    pub region: Option<String>,

    /// Deployment environment.
    #[arg(long)]
    pub environment: Option<String>,

    /// AWS profile.
    #[arg(long)]
    pub profile: Option<String>,

    /// S3 bucket holding the templates.
    #[arg(long)]
    pub bucket: Option<String>,

    /// Key prefix of the templates inside the bucket.
    #[arg(long)]
    pub bucket_key: Option<String>,

    /// Stack parameter passed to every stack (repeatable).
    #[arg(long = "parameter", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub parameters: Vec<(String, String)>,

    /// Capability acknowledged for every stack (repeatable).
    #[arg(long = "capability", value_name = "CAPABILITY")]
    pub capabilities: Vec<String>,

    /// Wait for each stack operation to finish.
    #[arg(long)]
    pub wait: bool,
}

impl RunArgs {
    /// Applies the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut DeployConfig) {
        let executor = &mut config.executor;
        if let Some(parallel) = self.parallel {
            executor.parallel = parallel;
        }
        if let Some(exit_on_error) = self.exit_on_error {
            executor.exit_on_error = exit_on_error;
        }
        if self.max_concurrency.is_some() {
            executor.max_concurrency = self.max_concurrency;
        }
        if self.timeout_secs.is_some() {
            executor.timeout_secs = self.timeout_secs;
        }
        executor.staged |= self.staged;

        if self.dry_run {
            config.backend.kind = BackendKind::DryRun;
        }

        let cloudformation = &mut config.backend.cloudformation;
        if let Some(region) = &self.region {
            cloudformation.region.clone_from(region);
        }
        if let Some(environment) = &self.environment {
            cloudformation.environment.clone_from(environment);
        }
        if let Some(profile) = &self.profile {
            cloudformation.profile = Some(profile.clone());
        }
        if let Some(bucket) = &self.bucket {
            cloudformation.template_bucket = Some(bucket.clone());
        }
        if let Some(key) = &self.bucket_key {
            cloudformation.template_bucket_key = Some(key.clone());
        }
        cloudformation.parameters.extend(self.parameters.iter().cloned());
        for capability in &self.capabilities {
            if !cloudformation.capabilities.contains(capability) {
                cloudformation.capabilities.push(capability.clone());
            }
        }
        cloudformation.wait |= self.wait;
    }
}

/// Parses a `KEY=VALUE` pair.
fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per log event.
    Json,
}
