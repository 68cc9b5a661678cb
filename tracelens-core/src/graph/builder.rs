//! Dependency graph construction from traces.
//!
//! Performance characteristics:
//! - Single trace: O(S) nodes and edges for S spans, plus O(k²) per
//!   sibling group of size k when blocking classification is on
//! - Multiple traces: one pass per trace, union-merged by node id
//!
//! Every parent link becomes a `calls` edge unless the child provably ran
//! alone under its parent (known time window, no overlapping sibling), in
//! which case the edge is marked `blocks`.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::common::GraphTraversal;
use crate::trace::{Span, Trace};

use super::critical_path::contains_cycle;
use super::model::{DependencyGraph, EdgeType, GraphEdge, GraphNode, Metadata};

/// Builds [`DependencyGraph`]s from one or more traces.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    classify_blocking: bool,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self {
            classify_blocking: true,
        }
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle `blocks` edge classification. When off, every edge is `calls`.
    pub fn with_blocking_classification(mut self, enabled: bool) -> Self {
        self.classify_blocking = enabled;
        self
    }

    /// Build the graph for a single trace and compute its critical path.
    pub fn build_from_trace(&self, trace: &Trace) -> DependencyGraph {
        let mut graph = self.assemble(trace);
        graph.recompute_critical_path();
        log_shape(&graph);
        graph
    }

    /// Union-merge the graphs of several traces into one.
    ///
    /// Node collisions keep the earliest start, the latest known end and a
    /// shallow metadata merge (later wins). Edge collisions average their
    /// weights. `total_duration` is the longest single trace, not the sum.
    pub fn build_from_multiple_traces(&self, traces: &[Trace]) -> DependencyGraph {
        let mut merged = DependencyGraph::new();
        let mut roots = BTreeSet::new();
        let mut leaves = BTreeSet::new();

        for trace in traces {
            let graph = self.assemble(trace);
            roots.extend(graph.root_nodes.iter().cloned());
            leaves.extend(graph.leaf_nodes.iter().cloned());

            for (id, node) in graph.nodes {
                match merged.nodes.get_mut(&id) {
                    Some(existing) => merge_node(existing, node),
                    None => {
                        merged.nodes.insert(id, node);
                    }
                }
            }

            for (key, edge) in graph.edges {
                match merged.edges.get_mut(&key) {
                    Some(existing) => {
                        existing.weight = (existing.weight + edge.weight) / 2.0;
                        existing.metadata.extend(edge.metadata);
                    }
                    None => {
                        merged.edges.insert(key, edge);
                    }
                }
            }
        }

        merged.root_nodes = roots.into_iter().collect();
        merged.leaf_nodes = leaves.into_iter().collect();
        merged.total_duration = traces
            .iter()
            .map(|t| t.duration.unwrap_or(0.0))
            .fold(0.0, f64::max);
        merged.recompute_critical_path();

        tracing::debug!(traces = traces.len(), "merged trace graphs");
        log_shape(&merged);
        merged
    }

    /// Nodes, edges, roots and leaves for one trace; no critical path yet.
    fn assemble(&self, trace: &Trace) -> DependencyGraph {
        let mut graph = DependencyGraph::new();

        for span in &trace.spans {
            graph.add_node(node_from_span(span));
        }

        let blocking = if self.classify_blocking {
            synchronous_children(&trace.spans)
        } else {
            Default::default()
        };

        for span in &trace.spans {
            let Some(parent) = span.parent_span_id.as_deref() else {
                continue;
            };
            let edge_type = if blocking.contains(span.span_id.as_str()) {
                EdgeType::Blocks
            } else {
                EdgeType::Calls
            };
            let mut edge = GraphEdge::new(
                parent,
                span.span_id.as_str(),
                edge_type,
                span.effective_duration().unwrap_or(0.0),
            );
            edge.metadata
                .insert("relationship".to_string(), "parent-child".into());
            // Dangling parent references are dropped here.
            graph.connect(edge);
        }

        graph.recompute_roots_and_leaves();
        graph.total_duration = trace.duration.unwrap_or(0.0);
        graph
    }
}

fn node_from_span(span: &Span) -> GraphNode {
    let tags: serde_json::Map<String, serde_json::Value> = span
        .tags
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();

    let mut metadata = Metadata::new();
    metadata.insert("traceId".to_string(), span.trace_id.clone().into());
    metadata.insert("tags".to_string(), serde_json::Value::Object(tags));
    metadata.insert("status".to_string(), span.status.as_str().into());

    let mut node = GraphNode::new(&span.span_id, &span.operation_name, span.start_time);
    node.end_time = span.end_time;
    node.duration = span.effective_duration();
    node.metadata = metadata;
    node
}

fn merge_node(existing: &mut GraphNode, incoming: GraphNode) {
    existing.metadata.extend(incoming.metadata);
    if incoming.start_time < existing.start_time {
        existing.start_time = incoming.start_time;
    }
    match (existing.end_time, incoming.end_time) {
        (Some(a), Some(b)) if b > a => existing.end_time = Some(b),
        (None, Some(b)) => existing.end_time = Some(b),
        _ => {}
    }
    if let Some(end) = existing.end_time {
        existing.duration = Some(end - existing.start_time);
    }
    for child in &incoming.children {
        existing.add_child(child);
    }
    for parent in &incoming.parents {
        existing.add_parent(parent);
    }
}

/// Span ids whose parent waited on them alone: the child's window is known
/// and no sibling window overlaps it (touching endpoints do not overlap).
/// A sibling with an unknown window disqualifies the whole group.
fn synchronous_children(spans: &[Span]) -> HashSet<&str> {
    let mut by_parent: HashMap<&str, Vec<&Span>> = HashMap::new();
    for span in spans {
        if let Some(parent) = span.parent_span_id.as_deref() {
            by_parent.entry(parent).or_default().push(span);
        }
    }

    let mut result = HashSet::new();
    for siblings in by_parent.values() {
        let windows: Option<Vec<(f64, f64)>> = siblings
            .iter()
            .map(|s| s.effective_end().map(|end| (s.start_time, end)))
            .collect();
        let Some(windows) = windows.map(|w| {
            w.into_iter()
                .zip(siblings.iter().map(|s| s.span_id.as_str()))
                .collect::<Vec<_>>()
        }) else {
            continue;
        };
        for (i, ((start, end), id)) in windows.iter().enumerate() {
            let overlaps = windows
                .iter()
                .enumerate()
                .any(|(j, ((s, e), _))| j != i && *s < *end && *start < *e);
            if !overlaps {
                result.insert(*id);
            }
        }
    }
    result
}

fn log_shape(graph: &DependencyGraph) {
    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        roots = graph.root_nodes.len(),
        critical_path = graph.critical_path.len(),
        "built dependency graph"
    );
    if contains_cycle(&graph.nodes, &graph.edges) {
        tracing::warn!("dependency graph contains a cycle; back edges ignored for the critical path");
    }
    let reachable = graph.reachable_from(graph.root_nodes.iter().cloned());
    if reachable.len() < graph.node_count() {
        tracing::warn!(
            unreachable = graph.node_count() - reachable.len(),
            "nodes not reachable from any root"
        );
    }
}

/// Convenience wrapper: build one trace with default settings.
pub fn build_graph(trace: &Trace) -> DependencyGraph {
    GraphBuilder::default().build_from_trace(trace)
}
