//! Arena-style dependency graph keyed by node id.
//!
//! Nodes and edges live in ordered maps owned by one [`DependencyGraph`];
//! relationships are id references, never pointers. Every structural
//! mutation goes through the helpers here so adjacency lists and the edge
//! map stay in agreement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::GraphTraversal;

/// Free-form node/edge metadata.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Kind of entity a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Span,
    Resource,
    Dependency,
}

/// Relationship carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    #[default]
    Calls,
    Depends,
    /// The caller is stalled for the whole child window.
    Blocks,
    Triggers,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Depends => "depends",
            Self::Blocks => "blocks",
            Self::Triggers => "triggers",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, start_time: f64) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Span,
            name: name.into(),
            start_time,
            end_time: None,
            duration: None,
            metadata: Metadata::new(),
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Duration, or 0 when unknown.
    #[inline]
    pub fn duration_or_zero(&self) -> f64 {
        self.duration.unwrap_or(0.0)
    }

    /// `[start, end]` window when the end can be determined.
    pub fn window(&self) -> Option<(f64, f64)> {
        self.end_time
            .or_else(|| self.duration.map(|d| self.start_time + d))
            .map(|end| (self.start_time, end))
    }

    /// Duration clipped to the node's own time window. Merged and simplified
    /// nodes sum nested durations, which can exceed the time they span.
    pub fn wall_clock(&self) -> f64 {
        match self.window() {
            Some((start, end)) => self.duration_or_zero().min((end - start).max(0.0)),
            None => self.duration_or_zero(),
        }
    }

    /// Add a child id unless already present.
    pub fn add_child(&mut self, id: &str) {
        if !self.children.iter().any(|c| c == id) {
            self.children.push(id.to_string());
        }
    }

    /// Add a parent id unless already present.
    pub fn add_parent(&mut self, id: &str) {
        if !self.parents.iter().any(|p| p == id) {
            self.parents.push(id.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub weight: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl GraphEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, edge_type: EdgeType, weight: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            edge_type,
            weight,
            metadata: Metadata::new(),
        }
    }

    pub fn key(&self) -> String {
        edge_key(&self.from, &self.to)
    }
}

/// Edge map key: `"{from}->{to}"`.
#[inline]
pub fn edge_key(from: &str, to: &str) -> String {
    format!("{}->{}", from, to)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: BTreeMap<String, GraphEdge>,
    pub root_nodes: Vec<String>,
    pub leaf_nodes: Vec<String>,
    pub critical_path: Vec<String>,
    /// Normalization denominator for every percentage metric.
    pub total_duration: f64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Duration of a node, 0 when unknown or absent.
    pub fn node_duration(&self, id: &str) -> f64 {
        self.nodes.get(id).map_or(0.0, GraphNode::duration_or_zero)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&GraphEdge> {
        self.edges.get(&edge_key(from, to))
    }

    pub fn is_on_critical_path(&self, id: &str) -> bool {
        self.critical_path.iter().any(|c| c == id)
    }

    pub fn is_root(&self, id: &str) -> bool {
        self.root_nodes.iter().any(|r| r == id)
    }

    /// Insert a node, replacing any node with the same id.
    pub fn add_node(&mut self, node: GraphNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge and record it in both endpoints' adjacency lists.
    ///
    /// Returns `false` (and inserts nothing) if either endpoint is missing.
    pub fn connect(&mut self, edge: GraphEdge) -> bool {
        if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
            return false;
        }
        if let Some(parent) = self.nodes.get_mut(&edge.from) {
            parent.add_child(&edge.to);
        }
        if let Some(child) = self.nodes.get_mut(&edge.to) {
            child.add_parent(&edge.from);
        }
        self.edges.insert(edge.key(), edge);
        true
    }

    /// Remove the `from -> to` edge and the matching adjacency entries.
    pub fn disconnect(&mut self, from: &str, to: &str) -> Option<GraphEdge> {
        if let Some(parent) = self.nodes.get_mut(from) {
            parent.children.retain(|c| c != to);
        }
        if let Some(child) = self.nodes.get_mut(to) {
            child.parents.retain(|p| p != from);
        }
        self.edges.remove(&edge_key(from, to))
    }

    /// Delete a node together with every incident edge and every reference
    /// to it in its neighbors' adjacency lists.
    pub fn remove_node(&mut self, id: &str) -> Option<GraphNode> {
        let node = self.nodes.remove(id)?;
        for parent in &node.parents {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|c| c != id);
            }
            self.edges.remove(&edge_key(parent, id));
        }
        for child in &node.children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parents.retain(|p| p != id);
            }
            self.edges.remove(&edge_key(id, child));
        }
        // Edges that were never mirrored in adjacency lists.
        self.edges.retain(|_, e| e.from != id && e.to != id);
        Some(node)
    }

    /// Rebuild `root_nodes` / `leaf_nodes` from adjacency lists (id order).
    pub fn recompute_roots_and_leaves(&mut self) {
        self.root_nodes = self
            .nodes
            .values()
            .filter(|n| n.parents.is_empty())
            .map(|n| n.id.clone())
            .collect();
        self.leaf_nodes = self
            .nodes
            .values()
            .filter(|n| n.children.is_empty())
            .map(|n| n.id.clone())
            .collect();
    }

    /// Rerun the longest-path computation over the current structure.
    pub fn recompute_critical_path(&mut self) {
        self.critical_path = super::critical_path(&self.nodes, &self.edges, &self.root_nodes);
    }

    /// Describe every disagreement between adjacency lists and the edge map.
    ///
    /// An empty result means the graph is structurally consistent.
    pub fn consistency_errors(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (key, edge) in &self.edges {
            if key != &edge.key() {
                problems.push(format!("edge {} stored under key {}", edge.key(), key));
            }
            match (self.nodes.get(&edge.from), self.nodes.get(&edge.to)) {
                (Some(from), Some(to)) => {
                    if !from.children.contains(&edge.to) {
                        problems.push(format!("{} missing child {}", edge.from, edge.to));
                    }
                    if !to.parents.contains(&edge.from) {
                        problems.push(format!("{} missing parent {}", edge.to, edge.from));
                    }
                }
                _ => problems.push(format!("edge {} has a dangling endpoint", key)),
            }
        }

        for node in self.nodes.values() {
            for child in &node.children {
                if !self.edges.contains_key(&edge_key(&node.id, child)) {
                    problems.push(format!("child link {} -> {} has no edge", node.id, child));
                }
            }
            for parent in &node.parents {
                if !self.edges.contains_key(&edge_key(parent, &node.id)) {
                    problems.push(format!("parent link {} -> {} has no edge", parent, node.id));
                }
            }
        }

        problems
    }

    pub fn is_consistent(&self) -> bool {
        self.consistency_errors().is_empty()
    }
}

impl GraphTraversal for DependencyGraph {
    type Node = String;

    fn neighbors(&self, node: &String) -> Vec<String> {
        self.nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn contains_node(&self, node: &String) -> bool {
        self.nodes.contains_key(node)
    }
}
