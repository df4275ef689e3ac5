// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stackshift
//!
//! A change-driven, dependency-aware deployment engine for infrastructure
//! stacks.
//!
//! ## Overview
//!
//! Stackshift turns the changes in a git commit into stack lifecycle
//! operations:
//!
//! - Added templates are created, modified templates are updated and removed
//!   templates are deleted
//! - Operations of one class run concurrently or one at a time
//! - A run stops at the first failure, or records every outcome and continues
//! - Declared dependencies order the operations in stages
//!
//! ## Architecture
//!
//! 1. **Change detection**: [`changeset::GitDiff`] produces a [`ChangeSet`]
//! 2. **Ordering**: [`graph::DependencyGraph`] splits each class into stages
//! 3. **Execution**: [`Executor`] dispatches every operation to a
//!    [`Backend`] and collects one outcome per identifier
//!
//! ## Modules
//!
//! - [`changeset`]: Change sets and git change detection
//! - [`graph`]: Dependency graph, loaders and staged plans
//! - [`executor`]: Execution engine and the backend capability
//! - [`backend`]: `CloudFormation` and dry-run backends
//! - [`config`]: Configuration parsing and validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! executor:
//!   parallel: true
//!   exit_on_error: true
//!   staged: true
//!
//! changes:
//!   filter: "^cloudformation/templates/"
//!
//! dependencies:
//!   edges:
//!     - cloudformation/templates/app.yaml: cloudformation/templates/vpc.yaml
//!
//! backend:
//!   kind: cloudformation
//!   cloudformation:
//!     region: us-east-1
//!     environment: nonprod
//!     capabilities: [CAPABILITY_IAM]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod backend;
pub mod changeset;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{CloudFormationBackend, DryRunBackend, ParameterSource};
pub use changeset::{ActionClass, ChangeSet, GitDiff};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DeployConfig};
pub use error::{BackendError, Result, StackshiftError};
pub use executor::{Backend, ExecutionResult, Executor, ExecutorOptions, OperationResult, ServiceParams};
pub use graph::{DependencyGraph, DependencyLoader, StagedPlan};
