//! Error types for the stackshift deployment engine.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration, dependency graphs, change detection, execution, and the
//! per-identifier failures reported by backends.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::changeset::ActionClass;
use crate::executor::ExecutionResult;

/// The main error type for stackshift.
#[derive(Debug, Error)]
pub enum StackshiftError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dependency graph errors.
    #[error("Dependency graph error: {0}")]
    Graph(#[from] GraphError),

    /// Change set construction errors.
    #[error("Change set error: {0}")]
    ChangeSet(#[from] ChangeSetError),

    /// Version-control errors.
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Execution errors.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Invalid change filter expression.
    #[error("Invalid change filter '{pattern}': {message}")]
    InvalidFilter {
        /// The rejected pattern.
        pattern: String,
        /// Why the pattern was rejected.
        message: String,
    },
}

/// Dependency graph errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph contains at least one cycle.
    #[error("Circular dependency detected among: {}", .nodes.join(", "))]
    CircularDependency {
        /// Nodes that could not be placed in any layer.
        nodes: Vec<String>,
    },

    /// A dependency entry was malformed.
    #[error("Invalid dependency entry #{index}: {message}")]
    InvalidEntry {
        /// Position of the entry in the source list.
        index: usize,
        /// Description of the problem.
        message: String,
    },
}

/// Change set construction errors.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// An identifier appears twice within one action class.
    #[error("Identifier '{id}' is listed more than once under {action}")]
    Duplicate {
        /// Action class containing the duplicate.
        action: ActionClass,
        /// The duplicated identifier.
        id: String,
    },

    /// An identifier appears in more than one action class.
    #[error("Identifier '{id}' is listed under both {first} and {second}")]
    Overlap {
        /// The shared identifier.
        id: String,
        /// First action class listing it.
        first: ActionClass,
        /// Second action class listing it.
        second: ActionClass,
    },
}

/// Version-control errors.
#[derive(Debug, Error)]
pub enum GitError {
    /// The git command could not be run.
    #[error("Failed to run git {args}: {message}")]
    CommandFailed {
        /// Arguments passed to git.
        args: String,
        /// Captured error output.
        message: String,
    },

    /// The git output could not be understood.
    #[error("Unexpected git output on line {line}: {message}")]
    UnexpectedOutput {
        /// One-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },
}

/// Run-level execution errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// An operation failed while abort-on-error was enabled.
    #[error("{backend} {action} aborted on '{id}': {source}")]
    Aborted {
        /// Backend that reported the failure.
        backend: String,
        /// Action class in progress.
        action: ActionClass,
        /// Identifier whose operation failed.
        id: String,
        /// Underlying operation error.
        source: BackendError,
        /// Outcomes recorded before the run stopped.
        partial: Box<ExecutionResult>,
    },
}

/// Failure of a single backend operation for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The provisioning backend rejected the operation.
    #[error("{0}")]
    Rejected(String),

    /// The operation could not be built from local inputs.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The operation exceeded its deadline.
    #[error("operation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The backend finished without reporting an outcome.
    #[error("backend completed without reporting an outcome")]
    NoOutcome,

    /// The operation task panicked.
    #[error("operation task panicked: {0}")]
    Panicked(String),

    /// The operation was skipped because a resource it is ordered after failed.
    #[error("skipped: '{0}' failed")]
    DependencyFailed(String),
}

/// Result type alias for stackshift operations.
pub type Result<T> = std::result::Result<T, StackshiftError>;

impl StackshiftError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is fatal at initialization time.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Graph(_))
    }

    /// Returns the partial result carried by an aborted run, if any.
    #[must_use]
    pub fn partial_result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Execution(ExecutionError::Aborted { partial, .. }) => Some(partial),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error for a file.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: Some(location.into()),
        }
    }
}

impl BackendError {
    /// Creates a rejection error with the given message.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_displays_message_only() {
        assert_eq!(BackendError::rejected("quota exceeded").to_string(), "quota exceeded");
    }

    #[test]
    fn test_cycle_lists_nodes() {
        let err = GraphError::CircularDependency {
            nodes: vec![String::from("a"), String::from("b")],
        };
        assert_eq!(err.to_string(), "Circular dependency detected among: a, b");
    }

    #[test]
    fn test_config_classification() {
        let err = StackshiftError::from(GraphError::CircularDependency { nodes: vec![] });
        assert!(err.is_config_error());
        assert!(!StackshiftError::internal("boom").is_config_error());
    }
}
