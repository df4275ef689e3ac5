//! Directed dependency graph with Kahn-style layering.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::changeset::ActionClass;
use crate::error::GraphError;

/// Directed graph over resource identifiers.
///
/// Each node maps to the set of nodes it depends on. The graph is built once
/// from static configuration and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// Node -> nodes it depends on.
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }

    /// Registers `dependent` as depending on `dependency`.
    ///
    /// Repeating an edge has no effect. Cycles are only detected when the
    /// layers are computed.
    pub fn depend_on(&mut self, dependent: impl Into<String>, dependency: impl Into<String>) {
        let dependency = dependency.into();
        self.edges.entry(dependency.clone()).or_default();
        self.edges
            .entry(dependent.into())
            .or_default()
            .insert(dependency);
    }

    /// Registers a node without dependencies.
    pub fn add_node(&mut self, id: impl Into<String>) {
        self.edges.entry(id.into()).or_default();
    }

    /// Returns true if `id` is a node of the graph.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// Returns the direct dependencies of `id`.
    pub fn dependencies_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(id)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Groups the nodes into topologically ordered layers.
    ///
    /// Layer 0 holds every node without dependencies; layer `k` holds the
    /// nodes whose dependencies all sit in layers `0..k`. Nodes inside a
    /// layer are sorted.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CircularDependency`] naming the nodes that could
    /// not be placed if the graph contains a cycle.
    pub fn topo_sorted_layers(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let mut remaining: BTreeMap<&str, BTreeSet<&str>> = self
            .edges
            .iter()
            .map(|(node, deps)| (node.as_str(), deps.iter().map(String::as_str).collect()))
            .collect();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(node, _)| *node)
                .collect();

            if ready.is_empty() {
                return Err(GraphError::CircularDependency {
                    nodes: remaining.keys().map(|n| (*n).to_string()).collect(),
                });
            }

            for node in &ready {
                remaining.remove(node);
            }
            for deps in remaining.values_mut() {
                for node in &ready {
                    deps.remove(node);
                }
            }

            layers.push(ready.into_iter().map(String::from).collect());
        }

        Ok(layers)
    }

    /// Splits `ids` into execution stages following the graph's layers.
    ///
    /// Identifiers unknown to the graph join the first stage. Within a stage
    /// the input order is kept, and empty stages are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle.
    pub fn stages_for(&self, ids: &[String]) -> Result<Vec<Vec<String>>, GraphError> {
        let layers = self.topo_sorted_layers()?;
        let layer_of: HashMap<&str, usize> = layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| layer.iter().map(move |id| (id.as_str(), i)))
            .collect();

        let mut stages: Vec<Vec<String>> = vec![Vec::new(); layers.len().max(1)];
        for id in ids {
            let index = layer_of.get(id.as_str()).copied().unwrap_or(0);
            stages[index].push(id.clone());
        }

        stages.retain(|stage| !stage.is_empty());
        Ok(stages)
    }

    /// Stages for one action class: dependencies first for creates and
    /// updates, dependents first for deletes.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle.
    pub fn stages_for_action(&self, action: ActionClass, ids: &[String]) -> Result<Vec<Vec<String>>, GraphError> {
        let mut stages = self.stages_for(ids)?;
        if action == ActionClass::Delete {
            stages.reverse();
        }
        Ok(stages)
    }
}
