//! Dependency graph module.
//!
//! This module models "depends-on" relationships between resource
//! identifiers and turns them into layers that can be executed in order.

mod dependency;
mod loader;
mod plan;

pub use dependency::DependencyGraph;
pub use loader::{DependencyEntry, DependencyLoader, DependencyTargets};
pub use plan::{PlannedStage, StagedPlan};
