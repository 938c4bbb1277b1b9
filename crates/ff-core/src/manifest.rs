//! The set of parsed nodes a compilation run works over

use crate::node::{CompiledArtifact, Node, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed nodes keyed by unique id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Root project name
    pub project_name: String,

    nodes: BTreeMap<String, Node>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            nodes: BTreeMap::new(),
        }
    }

    /// Insert a node, replacing any node with the same unique id.
    pub fn add_node(&mut self, node: Node) -> Option<Node> {
        let previous = self.nodes.insert(node.unique_id.to_string(), node);
        if let Some(prev) = &previous {
            log::debug!("Replaced node {} in manifest", prev.unique_id);
        }
        previous
    }

    pub fn get(&self, unique_id: &str) -> Option<&Node> {
        self.nodes.get(unique_id)
    }

    pub fn get_mut(&mut self, unique_id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(unique_id)
    }

    /// Nodes in unique-id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Find a node by name among `types`, optionally within one package.
    ///
    /// Returns the first match in unique-id order.
    pub fn find_by_name(
        &self,
        name: &str,
        package: Option<&str>,
        types: &[NodeType],
    ) -> Option<&Node> {
        self.nodes
            .values()
            .find(|node| node.unique_id.matches(name, package, types))
    }

    /// Compilation records for every node
    pub fn artifacts(&self) -> BTreeMap<String, CompiledArtifact> {
        self.nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.artifact()))
            .collect()
    }
}

#[cfg(test)]
#[path = "manifest_test.rs"]
mod tests;
