//! Graphviz DOT and JSON export of dependency graphs.
//!
//! Writes into a pre-sized buffer with the `std::fmt::Write` trait; one
//! pass over nodes, one over edges.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt::Write;

use crate::graph::DependencyGraph;

/// Longest label rendered before truncation, in characters.
const MAX_LABEL_CHARS: usize = 32;

/// Generate a Graphviz DOT representation of the graph.
///
/// - critical-path nodes are orange, everything else lightblue
/// - root nodes are drawn bold
/// - critical-path edges are thick and red; `blocks` edges are solid,
///   other edge types dashed
pub fn generate_dot(graph: &DependencyGraph) -> String {
    let estimated_capacity = graph.node_count() * 96 + graph.edge_count() * 64 + 160;
    let mut dot = String::with_capacity(estimated_capacity);

    if let Err(e) = write_dot_content(&mut dot, graph) {
        tracing::error!(error = %e, "failed to generate DOT string");
        return "digraph tracelens {\n}\n".to_string();
    }
    dot
}

fn write_dot_content(dot: &mut String, graph: &DependencyGraph) -> std::fmt::Result {
    let critical: HashSet<&str> = graph.critical_path.iter().map(String::as_str).collect();
    let critical_edges: HashSet<(&str, &str)> = graph
        .critical_path
        .windows(2)
        .map(|w| (w[0].as_str(), w[1].as_str()))
        .collect();

    writeln!(dot, "digraph tracelens {{")?;
    writeln!(dot, "  rankdir=LR;")?;
    writeln!(
        dot,
        "  node [shape=box, style=filled, fontname=\"JetBrains Mono\"];"
    )?;
    writeln!(dot)?;

    for node in graph.nodes.values() {
        let color = if critical.contains(node.id.as_str()) {
            "orange"
        } else {
            "lightblue"
        };
        let style = if graph.is_root(&node.id) {
            "filled,bold"
        } else {
            "filled"
        };
        writeln!(
            dot,
            "  \"{}\" [label=\"{}\\n{:.1}\", fillcolor={}, style=\"{}\"];",
            escape(&node.id),
            escape(&truncate_label(&node.name)),
            node.duration_or_zero(),
            color,
            style
        )?;
    }

    writeln!(dot)?;

    for edge in graph.edges.values() {
        let mut attrs = vec![format!("label=\"{}\"", edge.edge_type.as_str())];
        if critical_edges.contains(&(edge.from.as_str(), edge.to.as_str())) {
            attrs.push("color=red".to_string());
            attrs.push("penwidth=2".to_string());
        }
        if edge.edge_type != crate::graph::EdgeType::Blocks {
            attrs.push("style=dashed".to_string());
        }
        writeln!(
            dot,
            "  \"{}\" -> \"{}\" [{}];",
            escape(&edge.from),
            escape(&edge.to),
            attrs.join(", ")
        )?;
    }

    writeln!(dot, "}}")?;
    Ok(())
}

/// Cut `name` to [`MAX_LABEL_CHARS`] characters, never inside a code point.
fn truncate_label(name: &str) -> String {
    match name.char_indices().nth(MAX_LABEL_CHARS) {
        Some((byte, _)) => format!("{}...", &name[..byte]),
        None => name.to_string(),
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Typed node/edge lists for external viewers.
pub fn graph_to_json(graph: &DependencyGraph) -> Value {
    let critical: HashSet<&str> = graph.critical_path.iter().map(String::as_str).collect();

    let nodes: Vec<Value> = graph
        .nodes
        .values()
        .map(|n| {
            json!({
                "id": n.id,
                "label": n.name,
                "type": n.node_type,
                "duration": n.duration_or_zero(),
                "startTime": n.start_time,
                "isRoot": graph.is_root(&n.id),
                "isCritical": critical.contains(n.id.as_str()),
            })
        })
        .collect();

    let edges: Vec<Value> = graph
        .edges
        .values()
        .map(|e| {
            json!({
                "from": e.from,
                "to": e.to,
                "type": e.edge_type,
                "weight": e.weight,
                "isCritical": critical.contains(e.from.as_str()) && critical.contains(e.to.as_str()),
            })
        })
        .collect();

    json!({
        "nodes": nodes,
        "edges": edges,
        "stats": {
            "nodeCount": graph.node_count(),
            "edgeCount": graph.edge_count(),
            "rootCount": graph.root_nodes.len(),
            "leafCount": graph.leaf_nodes.len(),
            "criticalPathLength": graph.critical_path.len(),
            "totalDuration": graph.total_duration,
        }
    })
}
