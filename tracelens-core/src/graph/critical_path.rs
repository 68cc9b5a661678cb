//! Longest-duration root-to-leaf chain.
//!
//! Performance characteristics:
//! - Topological order: one DFS post-order pass from all roots, O(|V| + |E|)
//! - Relaxation: each edge relaxed once, O(|E|)
//!
//! Cycles are tolerated: a node discovered twice is not revisited, so a back
//! edge is simply ignored instead of looping.

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{DfsPostOrder, VisitMap};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::model::{edge_key, GraphEdge, GraphNode};

/// Weighted view of the adjacency lists; edges without a stored
/// [`GraphEdge`] weigh 0, children missing from `nodes` are dropped.
fn weighted_view<'a>(
    nodes: &'a BTreeMap<String, GraphNode>,
    edges: &BTreeMap<String, GraphEdge>,
) -> DiGraphMap<&'a str, f64> {
    let mut g = DiGraphMap::new();
    for id in nodes.keys() {
        g.add_node(id.as_str());
    }
    for (id, node) in nodes {
        for child in &node.children {
            if let Some((child_id, _)) = nodes.get_key_value(child) {
                let weight = edges
                    .get(&edge_key(id, child))
                    .map_or(0.0, |e| e.weight);
                g.add_edge(id.as_str(), child_id.as_str(), weight);
            }
        }
    }
    g
}

/// Compute the critical path as an ordered list of node ids, root first.
///
/// Distances start at −∞ except for `roots` (0). Nodes reachable from a
/// root are relaxed in topological order; the path ends at the node with
/// the greatest distance (first in id order on ties) and is rebuilt by
/// walking predecessor pointers. Returns an empty path when no root exists.
pub fn critical_path(
    nodes: &BTreeMap<String, GraphNode>,
    edges: &BTreeMap<String, GraphEdge>,
    roots: &[String],
) -> Vec<String> {
    if nodes.is_empty() {
        return Vec::new();
    }

    let g = weighted_view(nodes, edges);

    let mut distance: HashMap<&str, f64> =
        nodes.keys().map(|id| (id.as_str(), f64::NEG_INFINITY)).collect();
    for root in roots {
        if let Some(d) = distance.get_mut(root.as_str()) {
            *d = 0.0;
        }
    }

    // Post-order over everything reachable from any root, one shared
    // discovered set across roots.
    let mut post_order: Vec<&str> = Vec::with_capacity(nodes.len());
    let mut dfs = DfsPostOrder::empty(&g);
    for root in roots {
        let Some((root_id, _)) = nodes.get_key_value(root) else {
            continue;
        };
        if dfs.discovered.is_visited(&root_id.as_str()) {
            continue;
        }
        dfs.move_to(root_id.as_str());
        while let Some(n) = dfs.next(&g) {
            post_order.push(n);
        }
    }

    post_order.reverse();
    let position: HashMap<&str, usize> =
        post_order.iter().enumerate().map(|(i, &n)| (n, i)).collect();

    let mut predecessor: HashMap<&str, &str> = HashMap::new();
    for (index, &node) in post_order.iter().enumerate() {
        let current = distance.get(node).copied().unwrap_or(f64::NEG_INFINITY);
        if current == f64::NEG_INFINITY {
            continue;
        }
        for (_, child, &weight) in g.edges(node) {
            // Back edges close a cycle; ignore them.
            if position.get(child).map_or(true, |&p| p <= index) {
                continue;
            }
            let candidate = current + weight;
            let best = distance.get(child).copied().unwrap_or(f64::NEG_INFINITY);
            if candidate > best {
                distance.insert(child, candidate);
                predecessor.insert(child, node);
            }
        }
    }

    // First maximum in id order.
    let mut end: Option<(&str, f64)> = None;
    for id in nodes.keys() {
        let d = distance.get(id.as_str()).copied().unwrap_or(f64::NEG_INFINITY);
        if d == f64::NEG_INFINITY {
            continue;
        }
        if end.map_or(true, |(_, best)| d > best) {
            end = Some((id.as_str(), d));
        }
    }

    let Some((end_id, _)) = end else {
        return Vec::new();
    };

    let mut path = vec![end_id.to_string()];
    let mut seen: HashSet<&str> = HashSet::from([end_id]);
    let mut current = end_id;
    while let Some(&prev) = predecessor.get(current) {
        if !seen.insert(prev) {
            break;
        }
        path.push(prev.to_string());
        current = prev;
    }
    path.reverse();
    path
}

/// Whether the adjacency lists contain a directed cycle.
pub fn contains_cycle(
    nodes: &BTreeMap<String, GraphNode>,
    edges: &BTreeMap<String, GraphEdge>,
) -> bool {
    is_cyclic_directed(&weighted_view(nodes, edges))
}
