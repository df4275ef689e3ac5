//! Staged deployment plans.
//!
//! A plan is the order a staged run would follow for a change set, computed
//! without touching any backend.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::changeset::{ActionClass, ChangeSet};
use crate::error::GraphError;

use super::dependency::DependencyGraph;

/// The order a staged run would apply a change set in.
#[derive(Debug, Clone, Serialize)]
pub struct StagedPlan {
    /// When the plan was computed.
    pub created_at: DateTime<Utc>,
    /// Layers of the whole dependency graph.
    pub layers: Vec<Vec<String>>,
    /// Planned stages in execution order.
    pub stages: Vec<PlannedStage>,
}

/// A set of operations that may run together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStage {
    /// Action class of the stage.
    pub action: ActionClass,
    /// One-based position within the action class.
    pub index: usize,
    /// Identifiers in the stage.
    pub ids: Vec<String>,
}

impl StagedPlan {
    /// Builds the plan for `changes` over `graph`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle.
    pub fn build(graph: &DependencyGraph, changes: &ChangeSet) -> Result<Self, GraphError> {
        let layers = graph.topo_sorted_layers()?;

        let mut stages = Vec::new();
        for action in ActionClass::ALL {
            let ordered = graph.stages_for_action(action, changes.ids(action))?;
            stages.extend(ordered.into_iter().enumerate().map(|(i, ids)| PlannedStage {
                action,
                index: i + 1,
                ids,
            }));
        }

        Ok(Self {
            created_at: Utc::now(),
            layers,
            stages,
        })
    }

    /// Returns true if no operation is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Number of planned operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.ids.len()).sum()
    }

    /// Number of planned operations for `action`.
    #[must_use]
    pub fn count(&self, action: ActionClass) -> usize {
        self.stages
            .iter()
            .filter(|stage| stage.action == action)
            .map(|stage| stage.ids.len())
            .sum()
    }
}
