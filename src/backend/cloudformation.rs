//! AWS `CloudFormation` backend.
//!
//! Every changed template maps to one stack. The stack name is derived from
//! the template's file name; creates and updates send the template either by
//! S3 URL or inline, with the parameters resolved for that template.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{self, Capability};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::changeset::ActionClass;
use crate::config::CloudFormationConfig;
use crate::error::{BackendError, ConfigError, Result};
use crate::executor::{Backend, ServiceParams};

use super::parameters::{Parameter, ParameterSource, template_stem};

/// Name reported by [`CloudFormationBackend`].
pub const BACKEND_NAME: &str = "cloudformation";

/// Payload reported for a deleted stack.
pub const DELETED: &str = "deleted";

/// Converts a template path into a stack name.
///
/// The file name up to its first dot, lower-cased, with underscores replaced
/// by hyphens: `templates/Core_VPC.yaml` becomes `core-vpc`.
#[must_use]
pub fn stack_name(template: &str) -> String {
    template_stem(template).to_lowercase().replace('_', "-")
}

/// Builds the S3 URL of a template.
#[must_use]
pub fn template_url(bucket: &str, key_prefix: &str, template: &str) -> String {
    let prefix = key_prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("https://{bucket}.s3.amazonaws.com/{template}")
    } else {
        format!("https://{bucket}.s3.amazonaws.com/{prefix}/{template}")
    }
}

/// Parses a capability name.
#[must_use]
pub fn parse_capability(name: &str) -> Option<Capability> {
    match name {
        "CAPABILITY_IAM" => Some(Capability::CapabilityIam),
        "CAPABILITY_NAMED_IAM" => Some(Capability::CapabilityNamedIam),
        "CAPABILITY_AUTO_EXPAND" => Some(Capability::CapabilityAutoExpand),
        _ => None,
    }
}

/// Where a stack's template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Template stored in S3.
    Url(String),
    /// Template sent inline.
    Body(String),
}

/// Everything needed to create or update one stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackRequest {
    /// Stack name.
    pub stack_name: String,
    /// Template location.
    pub template: TemplateSource,
    /// Stack parameters.
    pub parameters: Vec<Parameter>,
    /// Acknowledged capabilities.
    pub capabilities: Vec<Capability>,
    /// Keep the stack on failure.
    pub disable_rollback: bool,
}

/// Coarse state of a stack operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackProgress {
    /// Still running.
    InProgress,
    /// Finished successfully.
    Complete,
    /// Failed or rolled back.
    Failed,
}

/// Classifies a `CloudFormation` stack status.
#[must_use]
pub fn classify_status(status: &str) -> StackProgress {
    if status.ends_with("_FAILED") || (status.contains("ROLLBACK") && status.ends_with("_COMPLETE")) {
        StackProgress::Failed
    } else if status.ends_with("_COMPLETE") {
        StackProgress::Complete
    } else {
        StackProgress::InProgress
    }
}

/// Backend that manages one `CloudFormation` stack per template.
#[derive(Debug)]
pub struct CloudFormationBackend {
    client: Client,
    settings: CloudFormationConfig,
    parameters: ParameterSource,
    capabilities: Vec<Capability>,
    /// Directory template paths are relative to.
    repo: PathBuf,
}

impl CloudFormationBackend {
    /// Loads AWS configuration and creates the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured capability is unknown.
    pub async fn connect(
        settings: CloudFormationConfig,
        parameters: ParameterSource,
        repo: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));
        if let Some(profile) = settings.resolved_profile() {
            info!("Using AWS profile: {profile}");
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;

        Self::with_client(Client::new(&sdk_config), settings, parameters, repo)
    }

    /// Creates the backend around an existing client.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured capability is unknown.
    pub fn with_client(
        client: Client,
        settings: CloudFormationConfig,
        parameters: ParameterSource,
        repo: impl Into<PathBuf>,
    ) -> Result<Self> {
        let capabilities = settings
            .capabilities
            .iter()
            .enumerate()
            .map(|(i, name)| {
                parse_capability(name).ok_or_else(|| {
                    ConfigError::validation(
                        format!("Unknown capability '{name}'"),
                        format!("backend.cloudformation.capabilities[{i}]"),
                    )
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            client,
            settings,
            parameters,
            capabilities,
            repo: repo.into(),
        })
    }

    /// Builds the create/update request for `template`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidRequest`] if the template or its
    /// parameter file cannot be read.
    pub fn request_for(&self, template: &str) -> std::result::Result<StackRequest, BackendError> {
        let source = match self.settings.template_location() {
            Some((bucket, prefix)) => TemplateSource::Url(template_url(bucket, prefix, template)),
            None => {
                let path = self.repo.join(template);
                let body = std::fs::read_to_string(&path).map_err(|e| {
                    BackendError::InvalidRequest(format!("cannot read template {}: {e}", path.display()))
                })?;
                TemplateSource::Body(body)
            }
        };

        Ok(StackRequest {
            stack_name: stack_name(template),
            template: source,
            parameters: self.parameters.parameters_for(template)?,
            capabilities: self.capabilities.clone(),
            disable_rollback: self.settings.disable_rollback,
        })
    }

    async fn create_stack(&self, template: &str) -> std::result::Result<String, BackendError> {
        let request = self.request_for(template)?;
        debug!("Creating cloudformation stack: {}", request.stack_name);

        let call = self
            .client
            .create_stack()
            .stack_name(&request.stack_name)
            .set_parameters(Some(sdk_parameters(&request.parameters)))
            .set_capabilities(Some(request.capabilities.clone()))
            .disable_rollback(request.disable_rollback);
        let call = match &request.template {
            TemplateSource::Url(url) => call.template_url(url),
            TemplateSource::Body(body) => call.template_body(body),
        };

        let output = call.send().await.map_err(|e| rejected(&e))?;
        let stack_id = output.stack_id().unwrap_or(request.stack_name.as_str()).to_string();

        if self.settings.wait {
            self.wait_for(&request.stack_name, ActionClass::Create).await?;
        }
        Ok(stack_id)
    }

    async fn update_stack(&self, template: &str) -> std::result::Result<String, BackendError> {
        let request = self.request_for(template)?;
        debug!("Updating cloudformation stack: {}", request.stack_name);

        let call = self
            .client
            .update_stack()
            .stack_name(&request.stack_name)
            .set_parameters(Some(sdk_parameters(&request.parameters)))
            .set_capabilities(Some(request.capabilities.clone()))
            .disable_rollback(request.disable_rollback);
        let call = match &request.template {
            TemplateSource::Url(url) => call.template_url(url),
            TemplateSource::Body(body) => call.template_body(body),
        };

        let output = call.send().await.map_err(|e| rejected(&e))?;
        let stack_id = output.stack_id().unwrap_or(request.stack_name.as_str()).to_string();

        if self.settings.wait {
            self.wait_for(&request.stack_name, ActionClass::Update).await?;
        }
        Ok(stack_id)
    }

    async fn delete_stack(&self, template: &str) -> std::result::Result<String, BackendError> {
        let name = stack_name(template);
        debug!("Deleting cloudformation stack: {name}");

        self.client
            .delete_stack()
            .stack_name(&name)
            .send()
            .await
            .map_err(|e| rejected(&e))?;

        if self.settings.wait {
            self.wait_for(&name, ActionClass::Delete).await?;
        }
        Ok(String::from(DELETED))
    }

    /// Polls the stack until its operation finishes.
    async fn wait_for(&self, name: &str, action: ActionClass) -> std::result::Result<String, BackendError> {
        let interval = Duration::from_secs(self.settings.wait_interval_secs.max(1));

        loop {
            let output = match self.client.describe_stacks().stack_name(name).send().await {
                Ok(output) => output,
                Err(e)
                    if action == ActionClass::Delete
                        && e.message().is_some_and(|m| m.contains("does not exist")) =>
                {
                    return Ok(String::from("DELETE_COMPLETE"));
                }
                Err(e) => return Err(rejected(&e)),
            };

            let Some(stack) = output.stacks().first() else {
                return Err(BackendError::rejected(format!(
                    "describe-stacks returned no stack named {name}"
                )));
            };
            let status = stack.stack_status().map_or("", |s| s.as_str());

            match classify_status(status) {
                StackProgress::Complete => {
                    info!("Stack {name} reached {status}");
                    return Ok(status.to_string());
                }
                StackProgress::Failed => {
                    let reason = stack.stack_status_reason().unwrap_or("no reason given");
                    return Err(BackendError::rejected(format!("stack {name} ended in {status}: {reason}")));
                }
                StackProgress::InProgress => {
                    debug!("Stack {name} is {status}, checking again in {}s", interval.as_secs());
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl Backend for CloudFormationBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn create(&self, params: ServiceParams) {
        let outcome = self.create_stack(params.id()).await;
        params.report(outcome);
    }

    async fn update(&self, params: ServiceParams) {
        let outcome = self.update_stack(params.id()).await;
        params.report(outcome);
    }

    async fn delete(&self, params: ServiceParams) {
        let outcome = self.delete_stack(params.id()).await;
        params.report(outcome);
    }
}

fn sdk_parameters(parameters: &[Parameter]) -> Vec<types::Parameter> {
    parameters
        .iter()
        .map(|p| {
            types::Parameter::builder()
                .parameter_key(&p.key)
                .parameter_value(&p.value)
                .build()
        })
        .collect()
}

/// Converts an SDK error into a rejection, keeping the service message.
fn rejected<E>(error: &E) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match (error.code(), error.message()) {
        (Some(code), Some(message)) => BackendError::Rejected(format!("{code}: {message}")),
        _ => BackendError::Rejected(DisplayErrorContext(error).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn offline_client() -> Client {
        let config = aws_sdk_cloudformation::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        Client::from_conf(config)
    }

    #[test]
    fn test_stack_name() {
        assert_eq!(stack_name("templates/Core_VPC.yaml"), "core-vpc");
        assert_eq!(stack_name("db.template.json"), "db");
        assert_eq!(stack_name("app"), "app");
    }

    #[test]
    fn test_template_url() {
        assert_eq!(
            template_url("acme", "stacks/", "templates/vpc.yaml"),
            "https://acme.s3.amazonaws.com/stacks/templates/vpc.yaml"
        );
        assert_eq!(
            template_url("acme", "", "vpc.yaml"),
            "https://acme.s3.amazonaws.com/vpc.yaml"
        );
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status("CREATE_COMPLETE"), StackProgress::Complete);
        assert_eq!(classify_status("DELETE_COMPLETE"), StackProgress::Complete);
        assert_eq!(classify_status("CREATE_IN_PROGRESS"), StackProgress::InProgress);
        assert_eq!(
            classify_status("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"),
            StackProgress::InProgress
        );
        assert_eq!(classify_status("ROLLBACK_COMPLETE"), StackProgress::Failed);
        assert_eq!(classify_status("UPDATE_ROLLBACK_COMPLETE"), StackProgress::Failed);
        assert_eq!(classify_status("CREATE_FAILED"), StackProgress::Failed);
    }

    #[test]
    fn test_parse_capability() {
        assert_eq!(parse_capability("CAPABILITY_NAMED_IAM"), Some(Capability::CapabilityNamedIam));
        assert_eq!(parse_capability("CAPABILITY_ROOT"), None);
    }

    #[test]
    fn test_request_with_bucket() {
        let settings = CloudFormationConfig {
            template_bucket: Some(String::from("acme")),
            template_bucket_key: Some(String::from("stacks")),
            capabilities: vec![String::from("CAPABILITY_IAM")],
            disable_rollback: true,
            parameters: BTreeMap::from([(String::from("Environment"), String::from("prod"))]),
            ..CloudFormationConfig::default()
        };
        let parameters = ParameterSource::new("missing", "prod").with_defaults(settings.parameters.clone());
        let backend =
            CloudFormationBackend::with_client(offline_client(), settings, parameters, ".").expect("backend");

        let request = backend.request_for("templates/My_App.yaml").expect("request");
        assert_eq!(request.stack_name, "my-app");
        assert_eq!(
            request.template,
            TemplateSource::Url(String::from("https://acme.s3.amazonaws.com/stacks/templates/My_App.yaml"))
        );
        assert_eq!(request.parameters, vec![Parameter::new("Environment", "prod")]);
        assert_eq!(request.capabilities, vec![Capability::CapabilityIam]);
        assert!(request.disable_rollback);
    }

    #[test]
    fn test_request_reads_template_body() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("vpc.yaml"), "Resources: {}\n").expect("write failed");

        let backend = CloudFormationBackend::with_client(
            offline_client(),
            CloudFormationConfig::default(),
            ParameterSource::new(dir.path(), "nonprod"),
            dir.path(),
        )
        .expect("backend");

        let request = backend.request_for("vpc.yaml").expect("request");
        assert_eq!(request.template, TemplateSource::Body(String::from("Resources: {}\n")));
        assert!(request.parameters.is_empty());

        assert!(matches!(
            backend.request_for("gone.yaml"),
            Err(BackendError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let settings = CloudFormationConfig {
            capabilities: vec![String::from("CAPABILITY_ROOT")],
            ..CloudFormationConfig::default()
        };
        let result = CloudFormationBackend::with_client(
            offline_client(),
            settings,
            ParameterSource::new(".", "nonprod"),
            ".",
        );
        assert!(result.is_err());
    }
}
