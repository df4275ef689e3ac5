//! Stack parameters: parameter files and template mappings.
//!
//! A parameter file is a JSON array in the format the AWS CLI uses:
//!
//! ```json
//! [{"ParameterKey": "Environment", "ParameterValue": "prod"}]
//! ```
//!
//! The file for a template is taken from the mappings file when it lists the
//! template, and otherwise looked up as
//! `<parameter_dir>/<environment>/<template stem>.parameters`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{BackendError, ConfigError, Result};

/// A single stack parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    #[serde(rename = "ParameterKey")]
    pub key: String,
    /// Parameter value.
    #[serde(rename = "ParameterValue")]
    pub value: String,
}

impl Parameter {
    /// Creates a parameter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Template path -> parameter file path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ParameterMappings {
    templates: BTreeMap<String, PathBuf>,
}

impl ParameterMappings {
    /// Parses mappings from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is not a map of strings.
    pub fn parse_yaml(content: &str, source: Option<&Path>) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let mappings: Option<Self> = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("Parameter mappings parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })?;
        Ok(mappings.unwrap_or_default())
    }

    /// Loads mappings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading parameter mappings: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::parse(format!("Failed to read file: {e}"), path.display().to_string())
        })?;
        Self::parse_yaml(&content, Some(path))
    }

    /// Returns the parameter file mapped to `template`.
    #[must_use]
    pub fn get(&self, template: &str) -> Option<&Path> {
        self.templates.get(template).map(PathBuf::as_path)
    }

    /// Number of mapped templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true if no template is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Resolves the parameters for each template.
#[derive(Debug, Clone)]
pub struct ParameterSource {
    /// Parameters applied to every stack.
    defaults: BTreeMap<String, String>,
    /// Root of the per-environment parameter directories.
    parameter_dir: PathBuf,
    /// Deployment environment.
    environment: String,
    /// Explicit template mappings.
    mappings: ParameterMappings,
}

impl ParameterSource {
    /// Creates a source over `parameter_dir/<environment>`.
    #[must_use]
    pub fn new(parameter_dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            defaults: BTreeMap::new(),
            parameter_dir: parameter_dir.into(),
            environment: environment.into(),
            mappings: ParameterMappings::default(),
        }
    }

    /// Sets parameters applied to every stack.
    #[must_use]
    pub fn with_defaults(mut self, defaults: BTreeMap<String, String>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets explicit template mappings.
    #[must_use]
    pub fn with_mappings(mut self, mappings: ParameterMappings) -> Self {
        self.mappings = mappings;
        self
    }

    /// Returns the parameter file for `template`, if one exists.
    #[must_use]
    pub fn locate(&self, template: &str) -> Option<PathBuf> {
        if let Some(mapped) = self.mappings.get(template) {
            return Some(mapped.to_path_buf());
        }

        let stem = template_stem(template);
        let candidate = self
            .parameter_dir
            .join(&self.environment)
            .join(format!("{stem}.parameters"));
        candidate.exists().then_some(candidate)
    }

    /// Returns the parameters for `template`.
    ///
    /// Defaults come first; values from the template's parameter file
    /// replace defaults with the same key.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidRequest`] if the parameter file cannot
    /// be read or parsed.
    pub fn parameters_for(&self, template: &str) -> std::result::Result<Vec<Parameter>, BackendError> {
        let mut merged = self.defaults.clone();

        if let Some(file) = self.locate(template) {
            info!("Using parameters file: {}", file.display());
            for parameter in read_parameter_file(&file)? {
                debug!("{}={}", parameter.key, parameter.value);
                merged.insert(parameter.key, parameter.value);
            }
        }

        Ok(merged
            .into_iter()
            .map(|(key, value)| Parameter { key, value })
            .collect())
    }
}

/// Reads a JSON parameter file.
///
/// # Errors
///
/// Returns [`BackendError::InvalidRequest`] if the file cannot be read or is
/// not a parameter array.
pub fn read_parameter_file(path: &Path) -> std::result::Result<Vec<Parameter>, BackendError> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        BackendError::InvalidRequest(format!("cannot read parameters file {}: {e}", path.display()))
    })?;
    serde_json::from_str(&data).map_err(|e| {
        BackendError::InvalidRequest(format!("invalid parameters file {}: {e}", path.display()))
    })
}

/// Returns the file name of `template` up to its first dot.
#[must_use]
pub fn template_stem(template: &str) -> &str {
    let file_name = template.rsplit('/').next().unwrap_or(template);
    file_name.split('.').next().unwrap_or(file_name)
}
