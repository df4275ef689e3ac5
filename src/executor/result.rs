//! Outcomes of an execution run.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::changeset::ActionClass;
use crate::error::BackendError;

/// Outcomes of one action class, keyed by identifier.
///
/// An identifier appears in at most one of the two maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationResult {
    /// Identifier -> backend payload.
    pub responses: BTreeMap<String, String>,
    /// Identifier -> failure.
    pub errors: BTreeMap<String, BackendError>,
}

impl OperationResult {
    /// Returns true if any operation failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of recorded outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.responses.len() + self.errors.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty() && self.errors.is_empty()
    }

    /// Returns the outcome recorded for `id`.
    #[must_use]
    pub fn outcome(&self, id: &str) -> Option<Result<&str, &BackendError>> {
        self.responses
            .get(id)
            .map(|payload| Ok(payload.as_str()))
            .or_else(|| self.errors.get(id).map(Err))
    }

    /// Moves every outcome of `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        self.responses.extend(other.responses);
        self.errors.extend(other.errors);
    }
}

/// Result of a full run across the three action classes.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Backend that performed the operations.
    pub backend: String,
    /// True if any class recorded a failure.
    pub has_errors: bool,
    /// Create outcomes.
    pub create: OperationResult,
    /// Update outcomes.
    pub update: OperationResult,
    /// Delete outcomes.
    pub delete: OperationResult,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished or stopped.
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Creates an empty result for a run starting now.
    #[must_use]
    pub fn start(backend: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            backend: backend.into(),
            has_errors: false,
            create: OperationResult::default(),
            update: OperationResult::default(),
            delete: OperationResult::default(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Returns the outcomes of `action`.
    #[must_use]
    pub const fn result(&self, action: ActionClass) -> &OperationResult {
        match action {
            ActionClass::Create => &self.create,
            ActionClass::Update => &self.update,
            ActionClass::Delete => &self.delete,
        }
    }

    pub(crate) const fn result_mut(&mut self, action: ActionClass) -> &mut OperationResult {
        match action {
            ActionClass::Create => &mut self.create,
            ActionClass::Update => &mut self.update,
            ActionClass::Delete => &mut self.delete,
        }
    }

    /// Stamps the finish time and folds the error flag from the classes.
    #[must_use]
    pub fn finish(mut self) -> Self {
        self.has_errors = ActionClass::ALL
            .iter()
            .any(|action| self.result(*action).has_errors());
        self.finished_at = Utc::now();
        self
    }

    /// Total number of successful operations.
    #[must_use]
    pub fn success_count(&self) -> usize {
        ActionClass::ALL
            .iter()
            .map(|action| self.result(*action).responses.len())
            .sum()
    }

    /// Total number of failed operations.
    #[must_use]
    pub fn error_count(&self) -> usize {
        ActionClass::ALL
            .iter()
            .map(|action| self.result(*action).errors.len())
            .sum()
    }

    /// Run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} on {}: {} succeeded, {} failed",
            self.run_id,
            self.backend,
            self.success_count(),
            self.error_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_folds_errors() {
        let mut result = ExecutionResult::start("dry-run");
        result
            .create
            .responses
            .insert(String::from("vpc"), String::from("ok"));
        assert!(!result.clone().finish().has_errors);

        result
            .delete
            .errors
            .insert(String::from("cache"), BackendError::NoOutcome);
        let result = result.finish();

        assert!(result.has_errors);
        assert_eq!(result.success_count(), 1);
        assert_eq!(result.error_count(), 1);
        assert!(result.finished_at >= result.started_at);
    }

    #[test]
    fn test_outcome_lookup() {
        let mut op = OperationResult::default();
        op.responses.insert(String::from("a"), String::from("id-a"));
        op.errors
            .insert(String::from("b"), BackendError::rejected("denied"));

        assert_eq!(op.outcome("a"), Some(Ok("id-a")));
        assert!(matches!(op.outcome("b"), Some(Err(BackendError::Rejected(_)))));
        assert_eq!(op.outcome("c"), None);
        assert_eq!(op.len(), 2);
    }
}
