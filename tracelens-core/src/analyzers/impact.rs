//! Whole-graph performance impact summary.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::graph::DependencyGraph;

use super::blocking::{BlockingPathAnalyzer, Bottleneck};
use super::percent;

/// Upper bound on the reported optimization potential (percent).
pub const MAX_OPTIMIZATION_POTENTIAL: f64 = 80.0;

/// Blocking threshold used for the bottleneck scan.
const BOTTLENECK_SCAN_THRESHOLD: f64 = 0.05;
const TOP_BOTTLENECKS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceImpact {
    pub critical_path_impact: f64,
    pub bottleneck_impact: f64,
    pub parallelization_opportunity: f64,
    pub total_optimization_potential: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ImpactCalculator {
    analyzer: BlockingPathAnalyzer,
}

impl ImpactCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `analyzer` (and its path cap) for the bottleneck scan.
    pub fn with_analyzer(mut self, analyzer: BlockingPathAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn calculate_performance_impact(&self, graph: &DependencyGraph) -> PerformanceImpact {
        let critical: f64 = graph
            .critical_path
            .iter()
            .map(|id| graph.node_duration(id))
            .sum();
        let critical_path_impact = percent(critical, graph.total_duration);

        let bottleneck_impact: f64 = self
            .major_bottlenecks(graph)
            .iter()
            .map(|b| b.impact_percentage)
            .sum();

        let parallelization_opportunity =
            percent(parallelizable_time(graph), graph.total_duration);

        PerformanceImpact {
            critical_path_impact,
            bottleneck_impact,
            parallelization_opportunity,
            total_optimization_potential: (bottleneck_impact + parallelization_opportunity)
                .min(MAX_OPTIMIZATION_POTENTIAL),
        }
    }

    /// Top bottlenecks from a 5% blocking scan, one entry per node (the
    /// occurrence with the higher impact wins).
    pub fn major_bottlenecks(&self, graph: &DependencyGraph) -> Vec<Bottleneck> {
        let mut unique: BTreeMap<String, Bottleneck> = BTreeMap::new();
        for path in self
            .analyzer
            .identify_blocking_paths(graph, BOTTLENECK_SCAN_THRESHOLD)
        {
            for b in path.bottlenecks {
                let replace = unique
                    .get(&b.node_id)
                    .map_or(true, |existing| b.impact_percentage > existing.impact_percentage);
                if replace {
                    unique.insert(b.node_id.clone(), b);
                }
            }
        }

        let mut top: Vec<Bottleneck> = unique.into_values().collect();
        top.sort_by(|a, b| b.impact_percentage.total_cmp(&a.impact_percentage));
        top.truncate(TOP_BOTTLENECKS);
        top
    }
}

/// Time that could be saved if every sibling group ran concurrently.
///
/// Siblings are nodes sharing a parent, unioned transitively through
/// shared parents; each group of two or more contributes `sum - max`.
fn parallelizable_time(graph: &DependencyGraph) -> f64 {
    let mut sets = DisjointSet::default();
    for node in graph.nodes.values() {
        let present: Vec<&str> = node
            .children
            .iter()
            .filter(|c| graph.nodes.contains_key(c.as_str()))
            .map(String::as_str)
            .collect();
        if let Some((first, rest)) = present.split_first() {
            sets.add(*first);
            for other in rest {
                sets.union(*first, *other);
            }
        }
    }

    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for id in graph.nodes.keys() {
        if let Some(root) = sets.find(id.as_str()) {
            groups.entry(root).or_default().push(graph.node_duration(id));
        }
    }

    groups
        .values()
        .filter(|durations| durations.len() > 1)
        .map(|durations| {
            let sum: f64 = durations.iter().sum();
            let max = durations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            sum - max
        })
        .sum()
}

/// Union-find over node ids, path-halving on lookup.
#[derive(Default)]
struct DisjointSet<'a> {
    parent: HashMap<&'a str, &'a str>,
}

impl<'a> DisjointSet<'a> {
    fn add(&mut self, id: &'a str) {
        self.parent.entry(id).or_insert(id);
    }

    fn find(&mut self, id: &str) -> Option<&'a str> {
        let mut current = *self.parent.get_key_value(id)?.0;
        loop {
            let parent = self.parent[current];
            if parent == current {
                return Some(current);
            }
            let grandparent = self.parent[parent];
            self.parent.insert(current, grandparent);
            current = grandparent;
        }
    }

    fn union(&mut self, a: &'a str, b: &'a str) {
        self.add(a);
        self.add(b);
        if let (Some(ra), Some(rb)) = (self.find(a), self.find(b)) {
            if ra != rb {
                // Smaller id becomes the representative for stable grouping.
                let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
                self.parent.insert(merge, keep);
            }
        }
    }
}
