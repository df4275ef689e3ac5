//! Provisioning backends.
//!
//! This module provides the concrete [`Backend`](crate::executor::Backend)
//! implementations and the parameter handling they share.

mod cloudformation;
mod dry_run;
mod parameters;

pub use cloudformation::{
    CloudFormationBackend, StackProgress, StackRequest, TemplateSource, classify_status, parse_capability,
    stack_name, template_url,
};
pub use dry_run::DryRunBackend;
pub use parameters::{Parameter, ParameterMappings, ParameterSource, read_parameter_file, template_stem};
