//! Configuration types for stackshift.
//!
//! This module defines the structs that map to the `stackshift.yaml` file.
//! Every section is optional; an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::executor::ExecutorOptions;
use crate::graph::DependencyEntry;

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeployConfig {
    /// How operations are dispatched.
    pub executor: ExecutionConfig,
    /// Where changes come from.
    pub changes: ChangesConfig,
    /// Ordering between resources.
    pub dependencies: DependenciesConfig,
    /// Which backend applies the changes.
    pub backend: BackendConfig,
}

/// Executor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Dispatch operations of a class concurrently.
    pub parallel: bool,
    /// Stop at the first failure.
    pub exit_on_error: bool,
    /// Maximum operations in flight in parallel mode.
    pub max_concurrency: Option<usize>,
    /// Per-operation timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Order operations by the dependency graph.
    pub staged: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            exit_on_error: true,
            max_concurrency: None,
            timeout_secs: None,
            staged: false,
        }
    }
}

impl ExecutionConfig {
    /// Converts the settings into executor options.
    ///
    /// A zero concurrency limit or timeout means "none"; the validator
    /// reports both as errors before this is reached.
    #[must_use]
    pub fn options(&self) -> ExecutorOptions {
        ExecutorOptions::default()
            .with_parallel(self.parallel)
            .with_exit_on_error(self.exit_on_error)
            .with_max_concurrency(self.max_concurrency.and_then(NonZeroUsize::new))
            .with_operation_timeout(
                self.timeout_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            )
    }
}

/// Change detection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChangesConfig {
    /// Repository to diff.
    pub repo: PathBuf,
    /// Only paths matching this regular expression are deployed.
    pub filter: Option<String>,
    /// Commit to diff `HEAD` against (defaults to `HEAD^`).
    pub base: Option<String>,
}

impl Default for ChangesConfig {
    fn default() -> Self {
        Self {
            repo: PathBuf::from("."),
            filter: None,
            base: None,
        }
    }
}

/// Dependency graph sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DependenciesConfig {
    /// YAML dependency file, relative to the configuration file.
    pub file: Option<PathBuf>,
    /// Inline dependency entries.
    pub edges: Vec<DependencyEntry>,
}

/// Backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Which backend to use.
    pub kind: BackendKind,
    /// `CloudFormation` settings.
    pub cloudformation: CloudFormationConfig,
}

/// Available backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// AWS `CloudFormation` stacks.
    #[default]
    Cloudformation,
    /// Logs what would happen without calling any API.
    DryRun,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloudformation => write!(f, "cloudformation"),
            Self::DryRun => write!(f, "dry-run"),
        }
    }
}

/// `CloudFormation` backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloudFormationConfig {
    /// AWS region.
    pub region: String,
    /// Deployment environment, used for profiles and parameter files.
    pub environment: String,
    /// Named AWS profile.
    pub profile: Option<String>,
    /// Profile prefix; the profile becomes `<prefix>-<environment>`.
    pub profile_prefix: Option<String>,
    /// S3 bucket holding the templates.
    pub template_bucket: Option<String>,
    /// Key prefix of the templates inside the bucket.
    pub template_bucket_key: Option<String>,
    /// Parameters passed to every stack.
    pub parameters: BTreeMap<String, String>,
    /// Directory of `<environment>/<stem>.parameters` files.
    pub parameter_dir: PathBuf,
    /// YAML file mapping templates to parameter files.
    pub parameter_mappings: Option<PathBuf>,
    /// Capabilities acknowledged for every stack.
    pub capabilities: Vec<String>,
    /// Keep failed stacks instead of rolling back.
    pub disable_rollback: bool,
    /// Wait for each stack operation to finish.
    pub wait: bool,
    /// Seconds between status polls while waiting.
    pub wait_interval_secs: u64,
}

impl Default for CloudFormationConfig {
    fn default() -> Self {
        Self {
            region: String::from("us-east-1"),
            environment: String::from("nonprod"),
            profile: None,
            profile_prefix: None,
            template_bucket: None,
            template_bucket_key: None,
            parameters: BTreeMap::new(),
            parameter_dir: PathBuf::from("cloudformation/parameters"),
            parameter_mappings: None,
            capabilities: Vec::new(),
            disable_rollback: false,
            wait: false,
            wait_interval_secs: 5,
        }
    }
}

impl CloudFormationConfig {
    /// Resolves the AWS profile to use, if any.
    ///
    /// A prefix wins over an explicit profile.
    #[must_use]
    pub fn resolved_profile(&self) -> Option<String> {
        match (&self.profile_prefix, &self.profile) {
            (Some(prefix), _) if !prefix.is_empty() => Some(format!("{prefix}-{}", self.environment)),
            (_, Some(profile)) if !profile.is_empty() => Some(profile.clone()),
            _ => None,
        }
    }

    /// Returns the template bucket and key prefix when both are set.
    #[must_use]
    pub fn template_location(&self) -> Option<(&str, &str)> {
        match (&self.template_bucket, &self.template_bucket_key) {
            (Some(bucket), Some(key)) if !bucket.is_empty() => Some((bucket.as_str(), key.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_defaults() {
        let config: DeployConfig = serde_yaml::from_str("{}").expect("parse failed");
        assert_eq!(config, DeployConfig::default());
        assert!(config.executor.parallel);
        assert!(config.executor.exit_on_error);
        assert_eq!(config.backend.kind, BackendKind::Cloudformation);
        assert_eq!(config.backend.cloudformation.region, "us-east-1");
    }

    #[test]
    fn test_execution_options() {
        let config = ExecutionConfig {
            parallel: false,
            max_concurrency: Some(3),
            timeout_secs: Some(0),
            ..ExecutionConfig::default()
        };
        let options = config.options();

        assert!(!options.parallel);
        assert_eq!(options.max_concurrency.map(NonZeroUsize::get), Some(3));
        assert!(options.operation_timeout.is_none());
    }

    #[test]
    fn test_profile_resolution() {
        let mut config = CloudFormationConfig {
            profile: Some(String::from("ops")),
            ..CloudFormationConfig::default()
        };
        assert_eq!(config.resolved_profile().as_deref(), Some("ops"));

        config.profile_prefix = Some(String::from("acme"));
        assert_eq!(config.resolved_profile().as_deref(), Some("acme-nonprod"));

        config.profile_prefix = None;
        config.profile = None;
        assert_eq!(config.resolved_profile(), None);
    }

    #[test]
    fn test_backend_kind_names() {
        let config: BackendConfig = serde_yaml::from_str("kind: dry-run").expect("parse failed");
        assert_eq!(config.kind, BackendKind::DryRun);
        assert_eq!(config.kind.to_string(), "dry-run");
    }
}
