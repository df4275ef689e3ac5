//! Loading dependency graphs from declarative YAML.
//!
//! The dependency file is a list of maps from a dependent to the resource(s)
//! it depends on:
//!
//! ```yaml
//! - templates/app.yaml: templates/vpc.yaml
//! - templates/app.yaml: [templates/db.yaml, templates/cache.yaml]
//! - templates/standalone.yaml: []
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::config::DependenciesConfig;
use crate::error::{ConfigError, GraphError, Result};

use super::dependency::DependencyGraph;

/// The resource(s) a dependent depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyTargets {
    /// A single dependency.
    One(String),
    /// Any number of dependencies.
    Many(Vec<String>),
}

impl DependencyTargets {
    /// Returns the dependencies as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(target) => std::slice::from_ref(target),
            Self::Many(targets) => targets,
        }
    }
}

/// One entry of a dependency list: dependent -> dependencies.
pub type DependencyEntry = BTreeMap<String, DependencyTargets>;

/// Builds [`DependencyGraph`]s from configuration.
#[derive(Debug, Default)]
pub struct DependencyLoader;

impl DependencyLoader {
    /// Builds a graph from parsed entries, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry is empty or names an empty identifier.
    pub fn from_entries(entries: &[DependencyEntry]) -> std::result::Result<DependencyGraph, GraphError> {
        let mut graph = DependencyGraph::new();
        Self::extend(&mut graph, entries)?;
        Ok(graph)
    }

    /// Adds `entries` to an existing graph.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry is empty or names an empty identifier.
    pub fn extend(graph: &mut DependencyGraph, entries: &[DependencyEntry]) -> std::result::Result<(), GraphError> {
        for (index, entry) in entries.iter().enumerate() {
            if entry.is_empty() {
                return Err(GraphError::InvalidEntry {
                    index,
                    message: String::from("entry has no dependent"),
                });
            }

            for (dependent, targets) in entry {
                if dependent.trim().is_empty() {
                    return Err(GraphError::InvalidEntry {
                        index,
                        message: String::from("dependent name is empty"),
                    });
                }

                graph.add_node(dependent.as_str());
                for dependency in targets.as_slice() {
                    if dependency.trim().is_empty() {
                        return Err(GraphError::InvalidEntry {
                            index,
                            message: format!("'{dependent}' depends on an empty name"),
                        });
                    }
                    debug!("{dependent} depends on {dependency}");
                    graph.depend_on(dependent.as_str(), dependency.as_str());
                }
            }
        }

        Ok(())
    }

    /// Builds the graph described by the `dependencies` configuration section.
    ///
    /// The dependency file, if any, is resolved against `base_dir` and loaded
    /// first; inline edges are added after it. The graph is checked for
    /// cycles before it is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded, an entry is malformed,
    /// or the graph contains a cycle.
    pub fn load(config: &DependenciesConfig, base_dir: &Path) -> Result<DependencyGraph> {
        let mut graph = match &config.file {
            Some(file) => Self::load_file(base_dir.join(file))?,
            None => DependencyGraph::new(),
        };
        Self::extend(&mut graph, &config.edges)?;

        let layers = graph.topo_sorted_layers()?;
        info!(
            "Dependency graph: {} resources, {} edges, {} layers",
            graph.len(),
            graph.edge_count(),
            layers.len()
        );
        Ok(graph)
    }

    /// Parses a dependency list from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or an entry is malformed.
    pub fn parse_yaml(content: &str, source: Option<&Path>) -> Result<DependencyGraph> {
        if content.trim().is_empty() {
            return Ok(DependencyGraph::new());
        }

        let entries: Option<Vec<DependencyEntry>> =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                message: format!("Dependency graph parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })?;

        Ok(Self::from_entries(&entries.unwrap_or_default())?)
    }

    /// Loads a dependency list from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(path: impl AsRef<Path>) -> Result<DependencyGraph> {
        let path = path.as_ref();
        info!("Loading dependency graph: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::parse(format!("Failed to read file: {e}"), path.display().to_string())
        })?;

        Self::parse_yaml(&content, Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackshiftError;
    use std::io::Write;

    #[test]
    fn test_parse_single_and_many() {
        let yaml = r"
- app.yaml: vpc.yaml
- app.yaml: [db.yaml, cache.yaml]
- standalone.yaml: []
";
        let graph = DependencyLoader::parse_yaml(yaml, None).expect("parse failed");

        assert_eq!(graph.len(), 5);
        assert_eq!(graph.edge_count(), 3);
        let layers = graph.topo_sorted_layers().expect("acyclic graph");
        assert_eq!(layers.last().map(Vec::as_slice), Some(&[String::from("app.yaml")][..]));
        assert!(layers[0].contains(&String::from("standalone.yaml")));
    }

    #[test]
    fn test_parse_empty() {
        let graph = DependencyLoader::parse_yaml("  \n", None).expect("parse failed");
        assert!(graph.is_empty());
    }

    #[test]
    fn test_parse_rejects_empty_entry() {
        let result = DependencyLoader::parse_yaml("- {}\n", None);
        assert!(matches!(
            result,
            Err(StackshiftError::Graph(GraphError::InvalidEntry { index: 0, .. }))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        let result = DependencyLoader::parse_yaml("app.yaml: [", None);
        assert!(matches!(
            result,
            Err(StackshiftError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "- web.yaml: app.yaml").expect("write failed");
        writeln!(file, "- app.yaml: web.yaml").expect("write failed");

        let graph = DependencyLoader::load_file(file.path()).expect("load failed");
        assert!(matches!(
            graph.topo_sorted_layers(),
            Err(GraphError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_load_config_merges_file_and_inline_edges() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("graph.yaml"), "- db.yaml: vpc.yaml\n").expect("write failed");

        let config = DependenciesConfig {
            file: Some(std::path::PathBuf::from("graph.yaml")),
            edges: vec![DependencyEntry::from([(
                String::from("app.yaml"),
                DependencyTargets::One(String::from("db.yaml")),
            )])],
        };

        let graph = DependencyLoader::load(&config, dir.path()).expect("load failed");
        let layers = graph.topo_sorted_layers().expect("acyclic graph");
        assert_eq!(layers, vec![vec!["vpc.yaml"], vec!["db.yaml"], vec!["app.yaml"]]);
    }

    #[test]
    fn test_load_config_rejects_cycle() {
        let config = DependenciesConfig {
            file: None,
            edges: vec![
                DependencyEntry::from([(String::from("a"), DependencyTargets::One(String::from("b")))]),
                DependencyEntry::from([(String::from("b"), DependencyTargets::One(String::from("a")))]),
            ],
        };

        let result = DependencyLoader::load(&config, Path::new("."));
        assert!(matches!(
            result,
            Err(StackshiftError::Graph(GraphError::CircularDependency { .. }))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = DependencyLoader::load_file("/nonexistent/graph.yaml");
        assert!(matches!(
            result,
            Err(StackshiftError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
