//! Configuration module for stackshift.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `stackshift.yaml`
//! - Environment overrides and `.env` loading
//! - Validation of configuration values

mod parser;
mod spec;
mod validator;

pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_ENVIRONMENT, ENV_PROFILE, ENV_REGION, find_config_file,
};
pub use spec::{
    BackendConfig, BackendKind, ChangesConfig, CloudFormationConfig, DependenciesConfig, DeployConfig,
    ExecutionConfig,
};
pub use validator::{ConfigValidator, KNOWN_CAPABILITIES, ValidationError, ValidationResult};
