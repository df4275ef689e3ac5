//! Configuration parser for loading and merging configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, StackshiftError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::DeployConfig;

/// Environment variable overriding the AWS region.
pub const ENV_REGION: &str = "STACKSHIFT_REGION";
/// Environment variable overriding the deployment environment.
pub const ENV_ENVIRONMENT: &str = "STACKSHIFT_ENVIRONMENT";
/// Environment variable overriding the AWS profile.
pub const ENV_PROFILE: &str = "STACKSHIFT_PROFILE";

/// Configuration parser for loading deployment configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Returns the directory relative paths in the configuration resolve to.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        self.base_path.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Resolves `path` against the base path.
    #[must_use]
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.base_path().join(path)
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(StackshiftError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::parse(format!("Failed to read file: {e}"), path.display().to_string())
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// An empty document yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            debug!("Configuration is empty, using defaults");
            return Ok(DeployConfig::default());
        }

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| {
            StackshiftError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!(
            "Parsed configuration for backend {} ({} inline dependencies)",
            config.backend.kind,
            config.dependencies.edges.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies environment overrides, reading variables through `lookup`.
    pub fn apply_env_overrides(config: &mut DeployConfig, lookup: impl Fn(&str) -> Option<String>) {
        let cloudformation = &mut config.backend.cloudformation;

        if let Some(region) = lookup(ENV_REGION) {
            debug!("Overriding backend.cloudformation.region from environment");
            cloudformation.region = region;
        }

        if let Some(environment) = lookup(ENV_ENVIRONMENT) {
            debug!("Overriding backend.cloudformation.environment from environment");
            cloudformation.environment = environment;
        }

        if let Some(profile) = lookup(ENV_PROFILE) {
            debug!("Overriding backend.cloudformation.profile from environment");
            cloudformation.profile = Some(profile);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self.resolve(".env");

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ConfigError::parse(
                    format!("Failed to load .env file: {e}"),
                    env_path.display().to_string(),
                )
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["stackshift.yaml", "stackshift.yml", "deploy.yaml", "deploy.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StackshiftError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
executor:
  parallel: false
";
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("parse failed");

        assert!(!config.executor.parallel);
        assert!(config.executor.exit_on_error);
        assert_eq!(config.backend.cloudformation.environment, "nonprod");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
executor:
  parallel: true
  exit_on_error: false
  max_concurrency: 4
  timeout_secs: 600
  staged: true

changes:
  repo: infra
  filter: "^templates/"
  base: main

dependencies:
  file: graph.yaml
  edges:
    - templates/app.yaml: [templates/db.yaml, templates/vpc.yaml]

backend:
  kind: cloudformation
  cloudformation:
    region: eu-west-1
    environment: prod
    profile_prefix: acme
    template_bucket: acme-templates
    template_bucket_key: stacks
    parameters:
      Environment: prod
    capabilities: [CAPABILITY_NAMED_IAM]
    wait: true
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("parse failed");

        assert!(config.executor.staged);
        assert_eq!(config.executor.max_concurrency, Some(4));
        assert_eq!(config.changes.filter.as_deref(), Some("^templates/"));
        assert_eq!(config.dependencies.edges.len(), 1);
        assert_eq!(config.backend.kind, BackendKind::Cloudformation);
        assert_eq!(
            config.backend.cloudformation.resolved_profile().as_deref(),
            Some("acme-prod")
        );
        assert_eq!(
            config.backend.cloudformation.template_location(),
            Some(("acme-templates", "stacks"))
        );
    }

    #[test]
    fn test_parse_empty_document() {
        let config = ConfigParser::new().parse_yaml("\n", None).expect("parse failed");
        assert_eq!(config, DeployConfig::default());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = ConfigParser::new().parse_yaml("executor: [", None);
        assert!(matches!(
            result,
            Err(StackshiftError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([(ENV_REGION, "ap-south-1"), (ENV_PROFILE, "deployer")]);
        let mut config = DeployConfig::default();

        ConfigParser::apply_env_overrides(&mut config, |name| vars.get(name).map(|v| (*v).to_string()));

        let cloudformation = &config.backend.cloudformation;
        assert_eq!(cloudformation.region, "ap-south-1");
        assert_eq!(cloudformation.environment, "nonprod");
        assert_eq!(cloudformation.profile.as_deref(), Some("deployer"));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().expect("temp dir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("create dirs");
        std::fs::write(dir.path().join("stackshift.yaml"), "{}\n").expect("write config");

        let found = find_config_file(&nested).expect("config found");
        assert_eq!(found, dir.path().join("stackshift.yaml"));
    }

    #[test]
    fn test_load_file_with_base_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("stackshift.yaml");
        std::fs::write(&path, "dependencies:\n  file: graph.yaml\n").expect("write config");

        let parser = ConfigParser::new().with_base_path(dir.path());
        let config = parser.load_file(&path).expect("load failed");
        let file = config.dependencies.file.expect("file set");

        assert_eq!(parser.resolve(&file), dir.path().join("graph.yaml"));
    }
}
