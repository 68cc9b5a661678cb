//! Graph simplification for large traces.
//!
//! Performance characteristics:
//! - Works on a clone; the caller's graph is never touched
//! - Each step is a single pass over the node map, O(|V| + |E|)
//! - Node limiting sorts once by score, O(|V| log |V|)
//!
//! Steps run in a fixed order: noise removal, short-span merging, linear
//! chain collapsing, node limiting. Roots and leaves are recomputed from
//! adjacency after every step, and the critical path is recomputed with
//! the full longest-path algorithm whenever a step changed the structure.
//! Re-optimizing an optimized graph is not idempotent: merged and
//! simplified nodes can qualify again under the new totals.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::graph::{DependencyGraph, EdgeType, GraphEdge, GraphNode, NodeType};

/// Share of the total duration under which a childless node is noise.
pub const NOISE_RATIO: f64 = 0.001;
/// Share of the total duration under which a parent/child pair is merged.
pub const MERGE_RATIO: f64 = 0.01;
/// Linear chains longer than this are collapsed.
pub const MIN_CHAIN_LEN: usize = 3;

/// Which optimization steps to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizeOptions {
    pub remove_noise: bool,
    pub merge_short_spans: bool,
    pub simplify_paths: bool,
    /// Cap on the node count; `None` or `Some(0)` means unlimited.
    pub max_nodes: Option<usize>,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            remove_noise: true,
            merge_short_spans: true,
            simplify_paths: true,
            max_nodes: None,
        }
    }
}

impl OptimizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_noise(mut self, enabled: bool) -> Self {
        self.remove_noise = enabled;
        self
    }

    pub fn merge_short_spans(mut self, enabled: bool) -> Self {
        self.merge_short_spans = enabled;
        self
    }

    pub fn simplify_paths(mut self, enabled: bool) -> Self {
        self.simplify_paths = enabled;
        self
    }

    pub fn max_nodes(mut self, max: Option<usize>) -> Self {
        self.max_nodes = max;
        self
    }
}

/// What an optimization run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub original_node_count: usize,
    pub optimized_node_count: usize,
    pub original_edge_count: usize,
    pub optimized_edge_count: usize,
    pub processing_time_ms: u64,
    pub optimizations: Vec<String>,
}

impl OptimizationResult {
    /// Record for a graph that was not optimized at all.
    pub fn unchanged(graph: &DependencyGraph) -> Self {
        Self {
            original_node_count: graph.node_count(),
            optimized_node_count: graph.node_count(),
            original_edge_count: graph.edge_count(),
            optimized_edge_count: graph.edge_count(),
            processing_time_ms: 0,
            optimizations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOptimizer;

impl GraphOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Optimize a copy of `graph`.
    pub fn optimize(
        &self,
        graph: &DependencyGraph,
        options: &OptimizeOptions,
    ) -> (DependencyGraph, OptimizationResult) {
        let started = Instant::now();
        let mut g = graph.clone();
        let mut optimizations = Vec::new();

        if options.remove_noise {
            let removed = remove_noise_nodes(&mut g);
            tracing::debug!(removed, "noise removal");
            if removed > 0 {
                optimizations.push(format!("Removed {} noise nodes", removed));
                g.recompute_critical_path();
            }
        }

        if options.merge_short_spans {
            let merged = merge_short_spans(&mut g);
            tracing::debug!(merged, "short span merge");
            if merged > 0 {
                optimizations.push(format!("Merged {} short spans", merged));
                g.recompute_critical_path();
            }
        }

        if options.simplify_paths {
            let simplified = simplify_linear_paths(&mut g);
            tracing::debug!(simplified, "linear path simplification");
            if simplified > 0 {
                optimizations.push(format!("Simplified {} linear paths", simplified));
                g.recompute_critical_path();
            }
        }

        if let Some(max) = options.max_nodes.filter(|&m| m > 0) {
            if g.node_count() > max {
                limit_nodes(&mut g, max);
                optimizations.push(format!("Limited to {} most important nodes", max));
            }
        }

        g.recompute_roots_and_leaves();
        g.recompute_critical_path();

        let result = OptimizationResult {
            original_node_count: graph.node_count(),
            optimized_node_count: g.node_count(),
            original_edge_count: graph.edge_count(),
            optimized_edge_count: g.edge_count(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            optimizations,
        };
        tracing::debug!(
            before = result.original_node_count,
            after = result.optimized_node_count,
            "graph optimized"
        );
        (g, result)
    }
}

/// Drop childless, non-root, off-critical-path nodes shorter than 0.1% of
/// the total duration.
fn remove_noise_nodes(g: &mut DependencyGraph) -> usize {
    let threshold = g.total_duration * NOISE_RATIO;
    let noise: Vec<String> = g
        .nodes
        .values()
        .filter(|n| {
            !g.is_root(&n.id)
                && !g.is_on_critical_path(&n.id)
                && n.children.is_empty()
                && n.duration_or_zero() < threshold
        })
        .map(|n| n.id.clone())
        .collect();

    for id in &noise {
        g.remove_node(id);
    }
    g.recompute_roots_and_leaves();
    noise.len()
}

/// Fold a short parent into its only, equally short child.
///
/// Candidates are collected in one pass. A pair is skipped when either
/// node already took part in an earlier merge of the same pass.
fn merge_short_spans(g: &mut DependencyGraph) -> usize {
    let threshold = g.total_duration * MERGE_RATIO;

    let mut pairs = Vec::new();
    for node in g.nodes.values() {
        if g.is_root(&node.id) || node.children.len() != 1 {
            continue;
        }
        let child_id = &node.children[0];
        let Some(child) = g.nodes.get(child_id) else {
            continue;
        };
        if child.parents.len() == 1
            && node.duration_or_zero() < threshold
            && child.duration_or_zero() < threshold
        {
            pairs.push((node.id.clone(), child_id.clone()));
        }
    }

    let mut consumed: HashSet<String> = HashSet::new();
    let mut merged = 0;
    for (parent_id, child_id) in pairs {
        if consumed.contains(&parent_id) || consumed.contains(&child_id) {
            continue;
        }
        if merge_pair(g, &parent_id, &child_id) {
            consumed.insert(parent_id);
            consumed.insert(child_id);
            merged += 1;
        }
    }

    g.recompute_roots_and_leaves();
    merged
}

fn merge_pair(g: &mut DependencyGraph, parent_id: &str, child_id: &str) -> bool {
    let Some(child) = g.nodes.get(child_id).cloned() else {
        return false;
    };
    if !g.nodes.contains_key(parent_id) {
        return false;
    }

    let outgoing: Vec<GraphEdge> = child
        .children
        .iter()
        .filter(|gc| gc.as_str() != parent_id)
        .map(|gc| {
            let mut edge = g
                .edge(child_id, gc)
                .cloned()
                .unwrap_or_else(|| GraphEdge::new(child_id, gc.as_str(), EdgeType::Calls, 0.0));
            edge.from = parent_id.to_string();
            edge
        })
        .collect();

    g.disconnect(parent_id, child_id);
    g.remove_node(child_id);

    if let Some(parent) = g.nodes.get_mut(parent_id) {
        parent.name = format!("{} → {}", parent.name, child.name);
        parent.duration = Some(parent.duration_or_zero() + child.duration_or_zero());
        parent.end_time = child.end_time.or(parent.end_time);
        parent.metadata.insert("merged".to_string(), true.into());
        parent.metadata.insert(
            "originalNodes".to_string(),
            serde_json::json!([parent_id, child_id]),
        );
    }

    for edge in outgoing {
        g.connect(edge);
    }
    true
}

/// Collapse every linear chain longer than [`MIN_CHAIN_LEN`] into one
/// synthetic `simplified_{first}_{last}` node.
fn simplify_linear_paths(g: &mut DependencyGraph) -> usize {
    let ids: Vec<String> = g.nodes.keys().cloned().collect();
    let mut processed: HashSet<String> = HashSet::new();
    let mut simplified = 0;

    for id in ids {
        if processed.contains(&id) || g.is_root(&id) {
            continue;
        }
        let Some(node) = g.nodes.get(&id) else {
            continue;
        };
        // Only start at the head of a chain; the rest is picked up from there.
        if let [parent_id] = node.parents.as_slice() {
            let parent_extends_chain = g.nodes.get(parent_id).map_or(false, |p| {
                p.children.len() == 1 && !g.is_root(parent_id) && !processed.contains(parent_id)
            });
            if parent_extends_chain {
                continue;
            }
        }

        let chain = linear_chain(g, &id, &processed);
        processed.extend(chain.iter().cloned());
        if chain.len() > MIN_CHAIN_LEN && collapse_chain(g, &chain) {
            simplified += 1;
        }
    }

    g.recompute_roots_and_leaves();
    simplified
}

fn linear_chain(g: &DependencyGraph, start: &str, processed: &HashSet<String>) -> Vec<String> {
    let mut chain = vec![start.to_string()];
    let mut current = start;
    loop {
        let Some(node) = g.nodes.get(current) else {
            break;
        };
        let [child_id] = node.children.as_slice() else {
            break;
        };
        let Some(child) = g.nodes.get(child_id) else {
            break;
        };
        if child.parents.len() != 1 || processed.contains(child_id) || chain.contains(child_id) {
            break;
        }
        chain.push(child_id.clone());
        current = child_id;
    }
    chain
}

fn collapse_chain(g: &mut DependencyGraph, chain: &[String]) -> bool {
    let (Some(first_id), Some(last_id)) = (chain.first(), chain.last()) else {
        return false;
    };
    let (Some(first), Some(last)) = (g.nodes.get(first_id), g.nodes.get(last_id)) else {
        return false;
    };
    let new_id = format!("simplified_{}_{}", first_id, last_id);
    if g.nodes.contains_key(&new_id) {
        return false;
    }

    let duration: f64 = chain.iter().map(|id| g.node_duration(id)).sum();
    // The window spans the whole chain; nested chains end at their head.
    let end_time = chain
        .iter()
        .filter_map(|id| g.nodes.get(id).and_then(GraphNode::window))
        .map(|(_, end)| end)
        .reduce(f64::max);

    let mut node = GraphNode::new(
        new_id.as_str(),
        format!("{} ... {} ({} steps)", first.name, last.name, chain.len()),
        first.start_time,
    );
    node.node_type = NodeType::Span;
    node.end_time = end_time;
    node.duration = Some(duration);
    node.metadata.insert("simplified".to_string(), true.into());
    node.metadata
        .insert("originalPath".to_string(), serde_json::json!(chain));
    node.metadata
        .insert("stepCount".to_string(), chain.len().into());

    let incoming: Vec<GraphEdge> = first
        .parents
        .iter()
        .filter_map(|p| g.edge(p, first_id).cloned())
        .map(|mut e| {
            e.to = new_id.clone();
            e
        })
        .collect();
    let outgoing: Vec<GraphEdge> = last
        .children
        .iter()
        .filter_map(|c| g.edge(last_id, c).cloned())
        .map(|mut e| {
            e.from = new_id.clone();
            e
        })
        .collect();

    for id in chain {
        g.remove_node(id);
    }
    g.add_node(node);
    for edge in incoming.into_iter().chain(outgoing) {
        g.connect(edge);
    }
    true
}

/// Keep the `max` highest-scoring nodes.
///
/// Score: +100 on the critical path, +50 for a root, duration share × 50,
/// and 5 per adjacency entry. Ties keep id order.
fn limit_nodes(g: &mut DependencyGraph, max: usize) {
    let total = g.total_duration;
    let mut scored: Vec<(String, f64)> = g
        .nodes
        .values()
        .map(|n| {
            let mut score = 0.0;
            if g.is_on_critical_path(&n.id) {
                score += 100.0;
            }
            if g.is_root(&n.id) {
                score += 50.0;
            }
            if total > 0.0 {
                score += n.duration_or_zero() / total * 50.0;
            }
            score += 5.0 * (n.children.len() + n.parents.len()) as f64;
            (n.id.clone(), score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let kept: HashSet<String> = scored.into_iter().take(max).map(|(id, _)| id).collect();

    g.nodes.retain(|id, _| kept.contains(id));
    g.edges
        .retain(|_, e| kept.contains(&e.from) && kept.contains(&e.to));
    for node in g.nodes.values_mut() {
        node.children.retain(|c| kept.contains(c));
        node.parents.retain(|p| kept.contains(p));
    }
    g.recompute_roots_and_leaves();
}
