//! A backend that only reports what it would do.

use async_trait::async_trait;
use tracing::info;

use crate::changeset::ActionClass;
use crate::error::BackendError;
use crate::executor::{Backend, ServiceParams};

use super::cloudformation::stack_name;
use super::parameters::ParameterSource;

/// Name reported by [`DryRunBackend`].
pub const BACKEND_NAME: &str = "dry-run";

/// Backend without side effects.
///
/// Creates and updates still resolve their parameters, so a broken
/// parameter file is reported as it would be by a real run.
#[derive(Debug, Default)]
pub struct DryRunBackend {
    parameters: Option<ParameterSource>,
}

impl DryRunBackend {
    /// Creates a dry-run backend.
    #[must_use]
    pub const fn new() -> Self {
        Self { parameters: None }
    }

    /// Resolves parameters from `source` for creates and updates.
    #[must_use]
    pub fn with_parameters(mut self, source: ParameterSource) -> Self {
        self.parameters = Some(source);
        self
    }

    /// Describes the operation for `template` without performing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the template's parameters cannot be resolved.
    pub fn describe(&self, action: ActionClass, template: &str) -> Result<String, BackendError> {
        let stack = stack_name(template);
        let parameter_count = match (&self.parameters, action) {
            (Some(source), ActionClass::Create | ActionClass::Update) => source.parameters_for(template)?.len(),
            _ => 0,
        };

        let summary = if parameter_count == 0 {
            format!("would {action} stack {stack}")
        } else {
            format!("would {action} stack {stack} with {parameter_count} parameters")
        };
        info!("[dry-run] {summary}");
        Ok(summary)
    }
}

#[async_trait]
impl Backend for DryRunBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn create(&self, params: ServiceParams) {
        let outcome = self.describe(ActionClass::Create, params.id());
        params.report(outcome);
    }

    async fn update(&self, params: ServiceParams) {
        let outcome = self.describe(ActionClass::Update, params.id());
        params.report(outcome);
    }

    async fn delete(&self, params: ServiceParams) {
        let outcome = self.describe(ActionClass::Delete, params.id());
        params.report(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::ChangeSet;
    use crate::executor::{Executor, ExecutorOptions};
    use std::sync::Arc;

    #[test]
    fn test_describe() {
        let backend = DryRunBackend::new();
        assert_eq!(
            backend.describe(ActionClass::Delete, "templates/Old_Cache.yaml").expect("describe"),
            "would delete stack old-cache"
        );
    }

    #[test]
    fn test_describe_counts_parameters() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join("nonprod")).expect("create dir");
        std::fs::write(
            dir.path().join("nonprod").join("db.parameters"),
            r#"[{"ParameterKey": "Size", "ParameterValue": "small"}]"#,
        )
        .expect("write failed");

        let backend = DryRunBackend::new().with_parameters(ParameterSource::new(dir.path(), "nonprod"));
        assert_eq!(
            backend.describe(ActionClass::Update, "db.yaml").expect("describe"),
            "would update stack db with 1 parameters"
        );
    }

    #[tokio::test]
    async fn test_dry_run_through_executor() {
        let changes = ChangeSet::new(
            vec![String::from("vpc.yaml")],
            vec![String::from("db.yaml")],
            vec![String::from("old-cache.yaml")],
        )
        .expect("valid change set");

        let result = Executor::new(ExecutorOptions::default())
            .run(&changes, Arc::new(DryRunBackend::new()))
            .await
            .expect("dry run never fails");

        assert!(!result.has_errors);
        assert_eq!(result.backend, BACKEND_NAME);
        assert_eq!(result.create.responses["vpc.yaml"], "would create stack vpc");
        assert_eq!(result.delete.responses["old-cache.yaml"], "would delete stack old-cache");
    }
}
