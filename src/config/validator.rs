//! Configuration validation.
//!
//! This module checks a loaded configuration for values that would only
//! fail later, in the middle of a deployment, and reports them up front.

use crate::error::{ConfigError, Result, StackshiftError};
use crate::graph::{DependencyGraph, DependencyLoader};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use super::spec::{ChangesConfig, CloudFormationConfig, DeployConfig, ExecutionConfig};

/// Capabilities `CloudFormation` accepts.
pub const KNOWN_CAPABILITIES: &[&str] = &["CAPABILITY_IAM", "CAPABILITY_NAMED_IAM", "CAPABILITY_AUTO_EXPAND"];

/// Validator for deployment configurations.
#[derive(Debug)]
pub struct ConfigValidator {
    /// Capabilities accepted in `backend.cloudformation.capabilities`.
    known_capabilities: HashSet<String>,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Creates a new validator with the standard capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self {
            known_capabilities: KNOWN_CAPABILITIES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(StackshiftError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    /// Validates a configuration and builds its dependency graph.
    ///
    /// The graph is always loaded, whether or not staged execution is
    /// enabled, so a broken dependency configuration fails at startup.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or the error raised while loading
    /// the dependency graph.
    pub fn validate_with_graph(
        &self,
        config: &DeployConfig,
        base_dir: &Path,
    ) -> Result<(ValidationResult, DependencyGraph)> {
        let result = self.validate(config)?;
        let graph = DependencyLoader::load(&config.dependencies, base_dir)?;
        Ok((result, graph))
    }

    /// Like [`ConfigValidator::check`], but also loads the dependency graph
    /// and reports a failure to load it as an error on `dependencies`.
    #[must_use]
    pub fn check_with_graph(
        &self,
        config: &DeployConfig,
        base_dir: &Path,
    ) -> (ValidationResult, Option<DependencyGraph>) {
        let mut result = self.check(config);
        match DependencyLoader::load(&config.dependencies, base_dir) {
            Ok(graph) => (result, Some(graph)),
            Err(e) => {
                result.errors.push(ValidationError {
                    field: String::from("dependencies"),
                    message: e.to_string(),
                });
                (result, None)
            }
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &DeployConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_executor(&config.executor, &mut result);
        Self::validate_changes(&config.changes, &mut result);
        self.validate_cloudformation(&config.backend.cloudformation, &mut result);

        if config.executor.staged
            && config.dependencies.file.is_none()
            && config.dependencies.edges.is_empty()
        {
            result
                .warnings
                .push(String::from("executor.staged: no dependencies configured, every stage will hold all changes"));
        }

        result
    }

    fn validate_executor(executor: &ExecutionConfig, result: &mut ValidationResult) {
        if executor.max_concurrency == Some(0) {
            result.errors.push(ValidationError {
                field: String::from("executor.max_concurrency"),
                message: String::from("Concurrency limit must be at least 1"),
            });
        }

        if executor.timeout_secs == Some(0) {
            result.errors.push(ValidationError {
                field: String::from("executor.timeout_secs"),
                message: String::from("Operation timeout must be at least 1 second"),
            });
        }

        if executor.max_concurrency.is_some() && !executor.parallel {
            result
                .warnings
                .push(String::from("executor.max_concurrency: ignored in sequential mode"));
        }
    }

    fn validate_changes(changes: &ChangesConfig, result: &mut ValidationResult) {
        if let Some(filter) = &changes.filter
            && let Err(e) = Regex::new(filter)
        {
            result.errors.push(ValidationError {
                field: String::from("changes.filter"),
                message: format!("Invalid filter '{filter}': {e}"),
            });
        }
    }

    fn validate_cloudformation(&self, cfn: &CloudFormationConfig, result: &mut ValidationResult) {
        if cfn.region.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("backend.cloudformation.region"),
                message: String::from("Region cannot be empty"),
            });
        }

        if cfn.environment.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("backend.cloudformation.environment"),
                message: String::from("Environment cannot be empty"),
            });
        }

        match (&cfn.template_bucket, &cfn.template_bucket_key) {
            (Some(bucket), None) if !bucket.is_empty() => {
                result.errors.push(ValidationError {
                    field: String::from("backend.cloudformation.template_bucket_key"),
                    message: String::from("A bucket key prefix is required when a template bucket is set"),
                });
            }
            (None, Some(_)) => {
                result.warnings.push(String::from(
                    "backend.cloudformation.template_bucket_key: ignored without a template bucket",
                ));
            }
            _ => {}
        }

        for (i, capability) in cfn.capabilities.iter().enumerate() {
            if !self.known_capabilities.contains(capability) {
                result.errors.push(ValidationError {
                    field: format!("backend.cloudformation.capabilities[{i}]"),
                    message: format!("Unknown capability '{capability}'"),
                });
            }
        }

        if cfn.wait && cfn.wait_interval_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("backend.cloudformation.wait_interval_secs"),
                message: String::from("Wait interval must be at least 1 second"),
            });
        }

        for key in cfn.parameters.keys() {
            if !is_valid_parameter_key(key) {
                result.errors.push(ValidationError {
                    field: format!("backend.cloudformation.parameters.{key}"),
                    message: format!("Parameter key '{key}' must be alphanumeric"),
                });
            }
        }
    }
}

/// Parameter keys are alphanumeric and non-empty.
fn is_valid_parameter_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric())
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let result = ConfigValidator::new()
            .validate(&DeployConfig::default())
            .expect("defaults are valid");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = DeployConfig::default();
        config.executor.max_concurrency = Some(0);
        config.changes.filter = Some(String::from("[unclosed"));
        config.backend.cloudformation.template_bucket = Some(String::from("templates"));
        config.backend.cloudformation.capabilities = vec![String::from("CAPABILITY_ROOT")];

        let result = ConfigValidator::new().check(&config);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();

        assert_eq!(result.error_count(), 4);
        assert!(fields.contains(&"executor.max_concurrency"));
        assert!(fields.contains(&"changes.filter"));
        assert!(fields.contains(&"backend.cloudformation.template_bucket_key"));
        assert!(fields.contains(&"backend.cloudformation.capabilities[0]"));
    }

    #[test]
    fn test_validate_reports_first_error() {
        let mut config = DeployConfig::default();
        config.backend.cloudformation.environment = String::new();

        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(matches!(
            err,
            StackshiftError::Config(ConfigError::ValidationError { field: Some(ref f), .. })
                if f == "backend.cloudformation.environment"
        ));
    }

    #[test]
    fn test_warnings() {
        let mut config = DeployConfig::default();
        config.executor.parallel = false;
        config.executor.max_concurrency = Some(2);
        config.executor.staged = true;

        let result = ConfigValidator::new().check(&config);
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 2);
    }

    #[test]
    fn test_parameter_keys() {
        assert!(is_valid_parameter_key("Environment"));
        assert!(is_valid_parameter_key("VpcCidr2"));
        assert!(!is_valid_parameter_key(""));
        assert!(!is_valid_parameter_key("vpc-cidr"));
    }

    fn cyclic_config() -> DeployConfig {
        let yaml = "dependencies:\n  edges:\n    - app.yaml: vpc.yaml\n    - vpc.yaml: app.yaml\n";
        let config: DeployConfig = serde_yaml::from_str(yaml).expect("valid yaml");
        assert!(!config.executor.staged);
        config
    }

    #[test]
    fn test_cyclic_dependencies_fail_without_staging() {
        let err = ConfigValidator::new()
            .validate_with_graph(&cyclic_config(), Path::new("."))
            .unwrap_err();
        assert!(matches!(err, StackshiftError::Graph(_)));
    }

    #[test]
    fn test_check_with_graph_reports_cycle() {
        let (result, graph) = ConfigValidator::new().check_with_graph(&cyclic_config(), Path::new("."));

        assert!(graph.is_none());
        assert!(!result.is_valid());
        assert_eq!(result.errors[0].field, "dependencies");
        assert!(result.errors[0].message.contains("app.yaml"));
    }

    #[test]
    fn test_validate_with_graph_builds_graph() {
        let mut config = DeployConfig::default();
        config.dependencies.edges = serde_yaml::from_str("- app.yaml: vpc.yaml\n").expect("valid yaml");

        let (result, graph) = ConfigValidator::new()
            .validate_with_graph(&config, Path::new("."))
            .expect("valid configuration");
        assert!(result.is_valid());
        assert_eq!(graph.edge_count(), 1);
    }
}
