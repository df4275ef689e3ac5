//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::changeset::{ActionClass, ChangeSet};
use crate::config::ValidationResult;
use crate::executor::{ExecutionResult, OperationResult};
use crate::graph::StagedPlan;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
}

/// Stage row for table display.
#[derive(Tabled)]
struct StageRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Stage")]
    stage: usize,
    #[tabled(rename = "Resources")]
    resources: String,
}

/// Outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a detected change set.
    #[must_use]
    pub fn format_change_set(&self, changes: &ChangeSet) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ChangeSetJson::from(changes)).unwrap_or_default(),
            OutputFormat::Text => Self::format_change_set_text(changes),
        }
    }

    fn format_change_set_text(changes: &ChangeSet) -> String {
        if changes.is_empty() {
            return format!("{} No changes detected.\n", "✓".green());
        }

        let rows: Vec<ChangeRow> = ActionClass::ALL
            .iter()
            .flat_map(|action| {
                changes.ids(*action).iter().map(|id| ChangeRow {
                    action: Self::format_action(*action),
                    resource: id.clone(),
                })
            })
            .collect();

        let mut output = String::from("\nDetected changes\n\n");
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');
        let _ = writeln!(output, "\nChanges: {}", Self::format_counts(changes));
        output
    }

    /// Formats a staged plan.
    #[must_use]
    pub fn format_plan(&self, plan: &StagedPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &StagedPlan) -> String {
        let mut output = String::from("\nDependency layers\n");
        if plan.layers.is_empty() {
            output.push_str("   No dependencies configured.\n");
        }
        for (i, layer) in plan.layers.iter().enumerate() {
            let _ = writeln!(output, "   {}. {}", i + 1, layer.join(", "));
        }

        if plan.is_empty() {
            let _ = write!(output, "\n{} No changes to apply.\n", "✓".green());
            return output;
        }

        output.push_str("\nExecution order\n\n");
        let rows: Vec<StageRow> = plan
            .stages
            .iter()
            .map(|stage| StageRow {
                action: Self::format_action(stage.action),
                stage: stage.index,
                resources: stage.ids.join(", "),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete",
            plan.count(ActionClass::Create).to_string().green(),
            plan.count(ActionClass::Update).to_string().yellow(),
            plan.count(ActionClass::Delete).to_string().red()
        );
        output
    }

    /// Formats the result of a run.
    ///
    /// Failures are listed per action class with the backend, action and
    /// identifier they belong to.
    #[must_use]
    pub fn format_result(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ResultJson::from(result)).unwrap_or_default(),
            OutputFormat::Text => Self::format_result_text(result),
        }
    }

    fn format_result_text(result: &ExecutionResult) -> String {
        let mut output = String::new();
        let _ = write!(output, "\nRun {} on {}\n\n", result.run_id, result.backend);

        let rows: Vec<OutcomeRow> = ActionClass::ALL
            .iter()
            .flat_map(|action| Self::outcome_rows(*action, result.result(*action)))
            .collect();

        if rows.is_empty() {
            output.push_str("   Nothing to do.\n");
        } else {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if result.has_errors {
            let _ = write!(output, "\n{} Errors:\n", "✗".red());
            for action in ActionClass::ALL {
                for (id, error) in &result.result(action).errors {
                    let _ = writeln!(output, "   - {} {action} {id}: {error}", result.backend);
                }
            }
        }

        let status = if result.has_errors {
            "failed".red().to_string()
        } else {
            "succeeded".green().to_string()
        };
        let _ = write!(
            output,
            "\nRun {status}: {} succeeded, {} failed in {}ms\n",
            result.success_count(),
            result.error_count(),
            result.duration_ms()
        );
        output
    }

    fn outcome_rows(action: ActionClass, outcomes: &OperationResult) -> Vec<OutcomeRow> {
        let succeeded = outcomes.responses.iter().map(|(id, payload)| OutcomeRow {
            action: Self::format_action(action),
            resource: id.clone(),
            result: "ok".green().to_string(),
            detail: Self::truncate(payload, 60),
        });
        let failed = outcomes.errors.iter().map(|(id, error)| OutcomeRow {
            action: Self::format_action(action),
            resource: id.clone(),
            result: "failed".red().to_string(),
            detail: Self::truncate(&error.to_string(), 60),
        });
        succeeded.chain(failed).collect()
    }

    /// Formats a configuration validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&ValidationJson::new(result, show_warnings)).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid!\n", "✓".green())
                } else {
                    let mut output = format!("{} Configuration has {} error(s):\n", "✗".red(), result.error_count());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                    output
                };

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats an action class with color.
    fn format_action(action: ActionClass) -> String {
        match action {
            ActionClass::Create => "+create".green().to_string(),
            ActionClass::Update => "~update".yellow().to_string(),
            ActionClass::Delete => "-delete".red().to_string(),
        }
    }

    fn format_counts(changes: &ChangeSet) -> String {
        format!(
            "{} to create, {} to update, {} to delete",
            changes.created().len().to_string().green(),
            changes.updated().len().to_string().yellow(),
            changes.deleted().len().to_string().red()
        )
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct ChangeSetJson {
    total: usize,
    created: Vec<String>,
    updated: Vec<String>,
    deleted: Vec<String>,
}

impl From<&ChangeSet> for ChangeSetJson {
    fn from(changes: &ChangeSet) -> Self {
        Self {
            total: changes.len(),
            created: changes.created().to_vec(),
            updated: changes.updated().to_vec(),
            deleted: changes.deleted().to_vec(),
        }
    }
}

#[derive(serde::Serialize)]
struct ResultJson {
    run_id: String,
    backend: String,
    has_errors: bool,
    succeeded: usize,
    failed: usize,
    started_at: String,
    duration_ms: i64,
    create: OperationJson,
    update: OperationJson,
    delete: OperationJson,
}

#[derive(serde::Serialize)]
struct OperationJson {
    responses: BTreeMap<String, String>,
    errors: BTreeMap<String, String>,
}

impl From<&OperationResult> for OperationJson {
    fn from(result: &OperationResult) -> Self {
        Self {
            responses: result.responses.clone(),
            errors: result
                .errors
                .iter()
                .map(|(id, error)| (id.clone(), error.to_string()))
                .collect(),
        }
    }
}

impl From<&ExecutionResult> for ResultJson {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            run_id: result.run_id.to_string(),
            backend: result.backend.clone(),
            has_errors: result.has_errors,
            succeeded: result.success_count(),
            failed: result.error_count(),
            started_at: result.started_at.to_rfc3339(),
            duration_ms: result.duration_ms(),
            create: OperationJson::from(&result.create),
            update: OperationJson::from(&result.update),
            delete: OperationJson::from(&result.delete),
        }
    }
}

#[derive(serde::Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationJson {
    fn new(result: &ValidationResult, show_warnings: bool) -> Self {
        Self {
            valid: result.is_valid(),
            errors: result.errors.iter().map(ToString::to_string).collect(),
            warnings: if show_warnings { result.warnings.clone() } else { Vec::new() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationError;
    use crate::error::BackendError;
    use crate::graph::DependencyGraph;

    fn sample_changes() -> ChangeSet {
        ChangeSet::new(
            vec![String::from("vpc.yaml")],
            vec![String::from("db.yaml")],
            vec![String::from("old.yaml")],
        )
        .expect("valid change set")
    }

    fn failed_result() -> ExecutionResult {
        let mut result = ExecutionResult::start("cloudformation");
        result
            .create
            .responses
            .insert(String::from("vpc.yaml"), String::from("arn:aws:cloudformation:stack/vpc"));
        result
            .update
            .errors
            .insert(String::from("db.yaml"), BackendError::rejected("No updates are to be performed."));
        result.finish()
    }

    #[test]
    fn test_change_set_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_change_set(&sample_changes())).expect("valid json");

        assert_eq!(json["total"], 3);
        assert_eq!(json["created"][0], "vpc.yaml");
        assert_eq!(json["deleted"][0], "old.yaml");
    }

    #[test]
    fn test_change_set_text() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_change_set(&sample_changes());
        assert!(text.contains("vpc.yaml"));
        assert!(text.contains("old.yaml"));

        let empty = formatter.format_change_set(&ChangeSet::default());
        assert!(empty.contains("No changes detected"));
    }

    #[test]
    fn test_result_text_lists_errors_per_class() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_result(&failed_result());

        assert!(text.contains("cloudformation update db.yaml: No updates are to be performed."));
        assert!(text.contains("1 succeeded, 1 failed"));
    }

    #[test]
    fn test_result_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_result(&failed_result())).expect("valid json");

        assert_eq!(json["backend"], "cloudformation");
        assert_eq!(json["has_errors"], true);
        assert_eq!(json["create"]["responses"]["vpc.yaml"], "arn:aws:cloudformation:stack/vpc");
        assert_eq!(json["update"]["errors"]["db.yaml"], "No updates are to be performed.");
    }

    #[test]
    fn test_plan_text() {
        let mut graph = DependencyGraph::new();
        graph.depend_on("db.yaml", "vpc.yaml");
        let plan = StagedPlan::build(&graph, &sample_changes()).expect("acyclic graph");

        let text = OutputFormatter::new(OutputFormat::Text).format_plan(&plan);
        assert!(text.contains("1. vpc.yaml"));
        assert!(text.contains("2. db.yaml"));
        assert!(text.contains("Execution order"));
    }

    #[test]
    fn test_validation_output() {
        let result = ValidationResult {
            errors: vec![ValidationError {
                field: String::from("executor.max_concurrency"),
                message: String::from("must be greater than zero"),
            }],
            warnings: vec![String::from("staged without dependencies")],
        };

        let text = OutputFormatter::new(OutputFormat::Text).format_validation(&result, true);
        assert!(text.contains("executor.max_concurrency: must be greater than zero"));
        assert!(text.contains("staged without dependencies"));

        let json: serde_json::Value = serde_json::from_str(
            &OutputFormatter::new(OutputFormat::Json).format_validation(&result, false),
        )
        .expect("valid json");
        assert_eq!(json["valid"], false);
        assert!(json["warnings"].as_array().expect("array").is_empty());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("abcdefghijkl", 8), "abcde...");
    }
}
