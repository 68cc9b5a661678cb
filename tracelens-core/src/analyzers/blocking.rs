//! Blocking path and bottleneck detection.
//!
//! Performance characteristics:
//! - Path enumeration is exhaustive (every simple root-to-leaf path), which
//!   is exponential in fan-out; `max_paths` bounds the work
//! - Per path: O(L) for durations, O(L²) worst case for nested blocking
//!   windows, where L is the path length

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::graph::{DependencyGraph, EdgeType, GraphNode};

use super::percent;

/// Default cap on enumerated root-to-leaf paths.
pub const DEFAULT_MAX_PATHS: usize = 10_000;
/// Default minimum blocking share (as a fraction) for a path to be kept.
pub const DEFAULT_BLOCKING_THRESHOLD: f64 = 0.1;
/// Node share of the total duration (percent) that makes a bottleneck.
pub const BOTTLENECK_PERCENT: f64 = 5.0;

/// Coarse classification of where a bottleneck spends its time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BottleneckType {
    Cpu,
    Io,
    Network,
    Database,
    External,
}

impl BottleneckType {
    /// Classify a node from its tags and (lowercased) name.
    ///
    /// First match wins: database, network, io, external, else cpu.
    pub fn classify(node: &GraphNode) -> Self {
        let tags = node.metadata.get("tags");
        let tag = |key: &str| tags.and_then(|t| t.get(key));
        let name = node.name.to_lowercase();

        if tag("db.type").map_or(false, is_truthy) || name.contains("database") || name.contains("query") {
            return Self::Database;
        }
        if tag("http.url").map_or(false, is_truthy) || name.contains("http") || name.contains("request") {
            return Self::Network;
        }
        if name.contains("file") || name.contains("read") || name.contains("write") {
            return Self::Io;
        }
        if tag("component").and_then(|v| v.as_str()) == Some("external") || name.contains("external") {
            return Self::External;
        }
        Self::Cpu
    }

    /// Static advice for this bottleneck kind.
    pub fn recommendations(&self) -> [&'static str; 3] {
        match self {
            Self::Database => [
                "Consider adding database indexes",
                "Optimize query performance",
                "Implement connection pooling",
            ],
            Self::Network => [
                "Implement request caching",
                "Reduce payload size",
                "Use connection keep-alive",
            ],
            Self::Io => [
                "Implement file caching",
                "Use asynchronous I/O operations",
                "Optimize file access patterns",
            ],
            Self::External => [
                "Implement circuit breaker pattern",
                "Add request timeout handling",
                "Consider service redundancy",
            ],
            Self::Cpu => [
                "Profile CPU-intensive operations",
                "Consider algorithm optimization",
                "Implement caching for expensive calculations",
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Io => "io",
            Self::Network => "network",
            Self::Database => "database",
            Self::External => "external",
        }
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub node_id: String,
    pub name: String,
    pub duration: f64,
    pub impact_percentage: f64,
    #[serde(rename = "type")]
    pub bottleneck_type: BottleneckType,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingPath {
    pub path: Vec<String>,
    /// Sum of node durations along the path.
    pub total_duration: f64,
    /// Sum of `blocks` edge weights along the path, nested windows once.
    pub blocking_duration: f64,
    pub impact_percentage: f64,
    pub bottlenecks: Vec<Bottleneck>,
}

#[derive(Debug, Clone)]
pub struct BlockingPathAnalyzer {
    max_paths: usize,
}

impl Default for BlockingPathAnalyzer {
    fn default() -> Self {
        Self {
            max_paths: DEFAULT_MAX_PATHS,
        }
    }
}

impl BlockingPathAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop enumerating after `max` root-to-leaf paths.
    pub fn with_max_paths(mut self, max: usize) -> Self {
        self.max_paths = max;
        self
    }

    /// Paths whose blocking share is at least `threshold` (a fraction of
    /// the graph's total duration), most impactful first.
    pub fn identify_blocking_paths(&self, graph: &DependencyGraph, threshold: f64) -> Vec<BlockingPath> {
        let mut result: Vec<BlockingPath> = self
            .all_paths(graph)
            .into_iter()
            .filter_map(|path| {
                let blocking_duration = blocking_duration(graph, &path);
                let impact_percentage = percent(blocking_duration, graph.total_duration);
                if impact_percentage < threshold * 100.0 {
                    return None;
                }
                Some(BlockingPath {
                    total_duration: path.iter().map(|id| graph.node_duration(id)).sum(),
                    blocking_duration,
                    impact_percentage,
                    bottlenecks: bottlenecks_on(graph, &path),
                    path,
                })
            })
            .collect();

        result.sort_by(|a, b| b.impact_percentage.total_cmp(&a.impact_percentage));
        tracing::debug!(paths = result.len(), threshold, "blocking paths identified");
        result
    }

    /// Every simple root-to-leaf path, roots in `root_nodes` order.
    ///
    /// A node already on the current branch is not revisited; a branch
    /// that runs into a missing node or a cycle yields no path.
    pub fn all_paths(&self, graph: &DependencyGraph) -> Vec<Vec<String>> {
        let mut paths = Vec::new();

        'roots: for root in &graph.root_nodes {
            let Some((root_id, _)) = graph.nodes.get_key_value(root) else {
                continue;
            };
            let mut stack: Vec<(&str, usize)> = vec![(root_id.as_str(), 0)];
            let mut on_path: HashSet<&str> = HashSet::from([root_id.as_str()]);

            while let Some(&(id, next)) = stack.last() {
                let children = graph.nodes.get(id).map_or(&[][..], |n| n.children.as_slice());

                if children.is_empty() {
                    if paths.len() >= self.max_paths {
                        tracing::warn!(max_paths = self.max_paths, "path enumeration cap reached");
                        break 'roots;
                    }
                    paths.push(stack.iter().map(|(n, _)| n.to_string()).collect());
                    stack.pop();
                    on_path.remove(id);
                    continue;
                }

                if next >= children.len() {
                    stack.pop();
                    on_path.remove(id);
                    continue;
                }

                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                if let Some((child_id, _)) = graph.nodes.get_key_value(&children[next]) {
                    if on_path.insert(child_id.as_str()) {
                        stack.push((child_id.as_str(), 0));
                    }
                }
            }
        }

        paths
    }
}

/// Sum of `blocks` edge weights along `path`.
///
/// A blocking child whose time window sits inside a window already counted
/// on this path adds nothing: the outer wait already covers it.
fn blocking_duration(graph: &DependencyGraph, path: &[String]) -> f64 {
    let mut counted: Vec<(f64, f64)> = Vec::new();
    let mut total = 0.0;

    for pair in path.windows(2) {
        let Some(edge) = graph.edge(&pair[0], &pair[1]) else {
            continue;
        };
        if edge.edge_type != EdgeType::Blocks {
            continue;
        }
        if let Some((start, end)) = graph.nodes.get(&pair[1]).and_then(GraphNode::window) {
            if counted.iter().any(|&(s, e)| s <= start && end <= e) {
                continue;
            }
            counted.push((start, end));
        }
        total += edge.weight;
    }
    total
}

/// Nodes on `path` whose wall-clock time is at least [`BOTTLENECK_PERCENT`]
/// of the total duration, biggest first.
fn bottlenecks_on(graph: &DependencyGraph, path: &[String]) -> Vec<Bottleneck> {
    let mut found: Vec<Bottleneck> = path
        .iter()
        .filter_map(|id| graph.nodes.get(id))
        .filter_map(|node| {
            let duration = node.duration.filter(|d| *d != 0.0)?;
            let impact_percentage = percent(node.wall_clock(), graph.total_duration);
            if impact_percentage < BOTTLENECK_PERCENT {
                return None;
            }
            let bottleneck_type = BottleneckType::classify(node);
            Some(Bottleneck {
                node_id: node.id.clone(),
                name: node.name.clone(),
                duration,
                impact_percentage,
                bottleneck_type,
                recommendations: bottleneck_type
                    .recommendations()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            })
        })
        .collect();
    found.sort_by(|a, b| b.impact_percentage.total_cmp(&a.impact_percentage));
    found
}
