//! Analysis pipeline: build, optimize, analyze, recommend.
//!
//! Every call owns the graph it builds; nothing is shared between calls,
//! so independent traces can be analyzed concurrently (`analyze_batch`).

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::analyzers::{
    BlockingPath, BlockingPathAnalyzer, Bottleneck, ImpactCalculator, PerformanceImpact,
    DEFAULT_MAX_PATHS,
};
use crate::error::{TracelensError, TracelensResult};
use crate::graph::{DependencyGraph, GraphBuilder};
use crate::optimizer::{GraphOptimizer, OptimizationResult, OptimizeOptions};
use crate::trace::Trace;

/// Node cap applied when optimizing a single trace.
pub const SINGLE_TRACE_MAX_NODES: usize = 100;
/// Node cap applied when optimizing merged traces.
pub const MULTI_TRACE_MAX_NODES: usize = 200;
pub const SINGLE_TRACE_THRESHOLD: f64 = 0.05;
pub const MULTI_TRACE_THRESHOLD: f64 = 0.03;
/// Most recommendations returned by one analysis.
pub const MAX_RECOMMENDATIONS: usize = 8;

/// Knobs for one analysis run. Unset caps fall back to the single- or
/// multi-trace defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    pub optimize_graph: bool,
    pub max_nodes: Option<usize>,
    /// Minimum blocking share, as a fraction (0.05 = 5%).
    pub blocking_threshold: Option<f64>,
    pub include_recommendations: bool,
    pub max_paths: usize,
    pub classify_blocking_edges: bool,
    pub optimizer: OptimizeOptions,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            optimize_graph: true,
            max_nodes: None,
            blocking_threshold: None,
            include_recommendations: true,
            max_paths: DEFAULT_MAX_PATHS,
            classify_blocking_edges: true,
            optimizer: OptimizeOptions::default(),
        }
    }
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn optimize_graph(mut self, enabled: bool) -> Self {
        self.optimize_graph = enabled;
        self
    }

    pub fn max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = Some(max);
        self
    }

    pub fn blocking_threshold(mut self, threshold: f64) -> Self {
        self.blocking_threshold = Some(threshold);
        self
    }

    pub fn include_recommendations(mut self, enabled: bool) -> Self {
        self.include_recommendations = enabled;
        self
    }

    pub fn max_paths(mut self, max: usize) -> Self {
        self.max_paths = max;
        self
    }

    pub fn classify_blocking_edges(mut self, enabled: bool) -> Self {
        self.classify_blocking_edges = enabled;
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizeOptions) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Reject values no analysis can honor.
    pub fn validate(&self) -> TracelensResult<()> {
        if let Some(t) = self.blocking_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(TracelensError::invalid_argument(format!(
                    "blocking threshold must be between 0 and 1, got {}",
                    t
                )));
            }
        }
        if self.max_paths == 0 {
            return Err(TracelensError::invalid_argument("max_paths must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub graph: DependencyGraph,
    pub blocking_paths: Vec<BlockingPath>,
    pub performance_impact: PerformanceImpact,
    pub optimization: OptimizationResult,
    /// Wall time of the whole analysis, milliseconds.
    pub processing_time_ms: u64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub depth: usize,
    pub critical_path_length: usize,
    pub average_node_duration: f64,
    pub max_node_duration: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisEngine;

impl AnalysisEngine {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a single trace.
    pub fn analyze_trace(&self, trace: &Trace, options: &AnalysisOptions) -> TracelensResult<AnalysisResult> {
        options.validate()?;
        trace.validate()?;

        let started = Instant::now();
        let graph = builder(options).build_from_trace(trace);
        let result = self.run(
            graph,
            options,
            SINGLE_TRACE_MAX_NODES,
            SINGLE_TRACE_THRESHOLD,
            started,
        );
        tracing::info!(
            trace_id = %trace.trace_id,
            nodes = result.graph.node_count(),
            blocking_paths = result.blocking_paths.len(),
            processing_time_ms = result.processing_time_ms,
            "trace analyzed"
        );
        Ok(result)
    }

    /// Merge several traces into one graph and analyze it.
    pub fn analyze_multiple_traces(
        &self,
        traces: &[Trace],
        options: &AnalysisOptions,
    ) -> TracelensResult<AnalysisResult> {
        options.validate()?;
        if traces.is_empty() {
            return Err(TracelensError::invalid_argument("at least one trace is required"));
        }
        for trace in traces {
            trace.validate()?;
        }

        let started = Instant::now();
        let graph = builder(options).build_from_multiple_traces(traces);
        let result = self.run(
            graph,
            options,
            MULTI_TRACE_MAX_NODES,
            MULTI_TRACE_THRESHOLD,
            started,
        );
        tracing::info!(
            traces = traces.len(),
            nodes = result.graph.node_count(),
            blocking_paths = result.blocking_paths.len(),
            processing_time_ms = result.processing_time_ms,
            "traces analyzed"
        );
        Ok(result)
    }

    /// Analyze independent traces in parallel, one result per trace in
    /// input order.
    pub fn analyze_batch(
        &self,
        traces: &[Trace],
        options: &AnalysisOptions,
    ) -> Vec<TracelensResult<AnalysisResult>> {
        traces
            .par_iter()
            .map(|trace| self.analyze_trace(trace, options))
            .collect()
    }

    /// Shape statistics for a graph.
    pub fn graph_summary(&self, graph: &DependencyGraph) -> GraphSummary {
        let durations: Vec<f64> = graph
            .nodes
            .values()
            .map(|n| n.duration_or_zero())
            .filter(|d| *d > 0.0)
            .collect();

        let (average_node_duration, max_node_duration) = if durations.is_empty() {
            (0.0, 0.0)
        } else {
            (
                durations.iter().sum::<f64>() / durations.len() as f64,
                durations.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        };

        GraphSummary {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            depth: graph_depth(graph),
            critical_path_length: graph.critical_path.len(),
            average_node_duration,
            max_node_duration,
        }
    }

    fn run(
        &self,
        graph: DependencyGraph,
        options: &AnalysisOptions,
        default_max_nodes: usize,
        default_threshold: f64,
        started: Instant,
    ) -> AnalysisResult {
        let (graph, optimization) = if options.optimize_graph {
            let optimize = options
                .optimizer
                .clone()
                .max_nodes(Some(options.max_nodes.unwrap_or(default_max_nodes)));
            GraphOptimizer::new().optimize(&graph, &optimize)
        } else {
            let record = OptimizationResult::unchanged(&graph);
            (graph, record)
        };

        let analyzer = BlockingPathAnalyzer::new().with_max_paths(options.max_paths);
        let threshold = options.blocking_threshold.unwrap_or(default_threshold);
        let blocking_paths = analyzer.identify_blocking_paths(&graph, threshold);

        let performance_impact = ImpactCalculator::new()
            .with_analyzer(analyzer)
            .calculate_performance_impact(&graph);

        let recommendations = if options.include_recommendations {
            recommendations(&graph, &blocking_paths, &performance_impact)
        } else {
            Vec::new()
        };

        AnalysisResult {
            graph,
            blocking_paths,
            performance_impact,
            optimization,
            processing_time_ms: started.elapsed().as_millis() as u64,
            recommendations,
        }
    }
}

fn builder(options: &AnalysisOptions) -> GraphBuilder {
    GraphBuilder::new().with_blocking_classification(options.classify_blocking_edges)
}

/// Rule-based advice, highest priority first, capped at
/// [`MAX_RECOMMENDATIONS`].
pub fn recommendations(
    graph: &DependencyGraph,
    blocking_paths: &[BlockingPath],
    impact: &PerformanceImpact,
) -> Vec<String> {
    let mut out = Vec::new();

    if impact.critical_path_impact > 70.0 {
        out.push("Critical path dominates execution time - focus optimization efforts here".to_string());
    }
    if impact.bottleneck_impact > 50.0 {
        out.push(
            "Major bottlenecks detected - prioritize the top 3 bottlenecks for optimization".to_string(),
        );
    }
    if impact.parallelization_opportunity > 20.0 {
        out.push(
            "Significant parallelization opportunities available - consider async processing"
                .to_string(),
        );
    }

    // One tip per node even when it sits on several paths.
    let mut all: Vec<&Bottleneck> = blocking_paths.iter().flat_map(|p| &p.bottlenecks).collect();
    all.sort_by(|a, b| b.impact_percentage.total_cmp(&a.impact_percentage));
    let mut seen = HashSet::new();
    for b in all.into_iter().filter(|b| seen.insert(b.node_id.as_str())).take(3) {
        if let Some(first) = b.recommendations.first() {
            out.push(format!("{}: {}", b.name, first));
        }
    }

    if graph.node_count() > 100 {
        out.push("Complex execution graph - consider breaking down large operations".to_string());
    }
    if graph.total_duration > 5000.0 {
        out.push("Long execution time detected - implement performance monitoring alerts".to_string());
    }

    out.truncate(MAX_RECOMMENDATIONS);
    out
}

/// Longest root-to-leaf chain, counted in nodes (a lone root is depth 1).
/// A child already on the current branch is not descended into.
fn graph_depth(graph: &DependencyGraph) -> usize {
    let mut memo: HashMap<&str, usize> = HashMap::new();
    let mut deepest = 0;

    for root in &graph.root_nodes {
        let Some((root_id, _)) = graph.nodes.get_key_value(root) else {
            continue;
        };
        let root_id = root_id.as_str();
        if !memo.contains_key(root_id) {
            let mut stack: Vec<(&str, usize)> = vec![(root_id, 0)];
            let mut on_branch: HashSet<&str> = HashSet::from([root_id]);

            while let Some(&(id, next)) = stack.last() {
                let children = graph.nodes.get(id).map_or(&[][..], |n| n.children.as_slice());
                if next < children.len() {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    if let Some((child_id, _)) = graph.nodes.get_key_value(&children[next]) {
                        let child_id = child_id.as_str();
                        if !memo.contains_key(child_id) && on_branch.insert(child_id) {
                            stack.push((child_id, 0));
                        }
                    }
                    continue;
                }
                let below = children
                    .iter()
                    .filter_map(|c| memo.get(c.as_str()))
                    .max()
                    .copied()
                    .unwrap_or(0);
                memo.insert(id, below + 1);
                on_branch.remove(id);
                stack.pop();
            }
        }
        deepest = deepest.max(memo.get(root_id).copied().unwrap_or(0));
    }

    deepest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Span;

    fn two_span_trace() -> Trace {
        Trace::from_spans(
            "t",
            vec![
                Span::new("t", "root", "GET /orders", 0.0).with_end(300.0),
                Span::new("t", "child", "SELECT orders", 100.0)
                    .with_parent("root")
                    .with_end(200.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_options_builder() {
        let opts = AnalysisOptions::new()
            .optimize_graph(false)
            .max_nodes(10)
            .blocking_threshold(0.2)
            .include_recommendations(false);
        assert!(!opts.optimize_graph);
        assert_eq!(opts.max_nodes, Some(10));
        assert_eq!(opts.blocking_threshold, Some(0.2));
        assert!(!opts.include_recommendations);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_options_reject_bad_threshold() {
        let opts = AnalysisOptions::new().blocking_threshold(1.5);
        assert!(matches!(
            opts.validate(),
            Err(TracelensError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_options_deserialize_partial() {
        let opts: AnalysisOptions =
            serde_json::from_str(r#"{"optimizeGraph":false,"maxNodes":5}"#).unwrap();
        assert!(!opts.optimize_graph);
        assert_eq!(opts.max_nodes, Some(5));
        assert!(opts.include_recommendations);
        assert!(opts.optimizer.simplify_paths);
    }

    #[test]
    fn test_unoptimized_record_is_trivial() {
        let result = AnalysisEngine::new()
            .analyze_trace(&two_span_trace(), &AnalysisOptions::new().optimize_graph(false))
            .unwrap();
        assert_eq!(result.optimization.original_node_count, 2);
        assert_eq!(result.optimization.optimized_node_count, 2);
        assert_eq!(result.optimization.original_edge_count, 1);
        assert_eq!(result.optimization.optimized_edge_count, 1);
        assert!(result.optimization.optimizations.is_empty());
    }

    #[test]
    fn test_recommendations_can_be_disabled() {
        let result = AnalysisEngine::new()
            .analyze_trace(
                &two_span_trace(),
                &AnalysisOptions::new().include_recommendations(false),
            )
            .unwrap();
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_recommendation_rules() {
        let graph = crate::graph::build_graph(&two_span_trace());
        let impact = PerformanceImpact {
            critical_path_impact: 90.0,
            bottleneck_impact: 60.0,
            parallelization_opportunity: 25.0,
            total_optimization_potential: 80.0,
        };
        let bottleneck = Bottleneck {
            node_id: "child".to_string(),
            name: "SELECT orders".to_string(),
            duration: 100.0,
            impact_percentage: 33.0,
            bottleneck_type: crate::analyzers::BottleneckType::Database,
            recommendations: vec!["Consider adding database indexes".to_string()],
        };
        let path = BlockingPath {
            path: vec!["root".to_string(), "child".to_string()],
            total_duration: 400.0,
            blocking_duration: 100.0,
            impact_percentage: 33.0,
            bottlenecks: vec![bottleneck.clone(), bottleneck],
        };

        let recs = recommendations(&graph, &[path], &impact);
        assert_eq!(
            recs,
            vec![
                "Critical path dominates execution time - focus optimization efforts here",
                "Major bottlenecks detected - prioritize the top 3 bottlenecks for optimization",
                "Significant parallelization opportunities available - consider async processing",
                "SELECT orders: Consider adding database indexes",
            ]
        );
    }

    #[test]
    fn test_recommendations_capped() {
        let mut graph = DependencyGraph::new();
        for i in 0..101 {
            graph.add_node(crate::graph::GraphNode::new(format!("n{}", i), "op", 0.0));
        }
        graph.total_duration = 10_000.0;
        let impact = PerformanceImpact {
            critical_path_impact: 90.0,
            bottleneck_impact: 60.0,
            parallelization_opportunity: 25.0,
            total_optimization_potential: 80.0,
        };
        let paths: Vec<BlockingPath> = (0..5)
            .map(|i| BlockingPath {
                path: vec![format!("n{}", i)],
                total_duration: 1.0,
                blocking_duration: 1.0,
                impact_percentage: 10.0,
                bottlenecks: vec![Bottleneck {
                    node_id: format!("n{}", i),
                    name: format!("op{}", i),
                    duration: 1.0,
                    impact_percentage: 10.0 - i as f64,
                    bottleneck_type: crate::analyzers::BottleneckType::Cpu,
                    recommendations: vec!["Profile CPU-intensive operations".to_string()],
                }],
            })
            .collect();
        let recs = recommendations(&graph, &paths, &impact);
        assert_eq!(recs.len(), MAX_RECOMMENDATIONS);
        assert_eq!(recs[3], "op0: Profile CPU-intensive operations");
        assert_eq!(recs[6], "Complex execution graph - consider breaking down large operations");
        assert_eq!(
            recs[7],
            "Long execution time detected - implement performance monitoring alerts"
        );
    }

    #[test]
    fn test_graph_summary_depth() {
        let engine = AnalysisEngine::new();
        let graph = crate::graph::build_graph(&two_span_trace());
        let summary = engine.graph_summary(&graph);
        assert_eq!(summary.node_count, 2);
        assert_eq!(summary.edge_count, 1);
        assert_eq!(summary.depth, 2);
        assert_eq!(summary.critical_path_length, 2);
        assert_eq!(summary.max_node_duration, 300.0);
        assert_eq!(summary.average_node_duration, 200.0);
    }

    #[test]
    fn test_graph_summary_empty() {
        let summary = AnalysisEngine::new().graph_summary(&DependencyGraph::new());
        assert_eq!(summary, GraphSummary::default());
    }

    #[test]
    fn test_analyze_rejects_mismatched_span() {
        let mut trace = two_span_trace();
        trace.spans[1].trace_id = "other".to_string();
        let err = AnalysisEngine::new()
            .analyze_trace(&trace, &AnalysisOptions::default())
            .unwrap_err();
        assert!(matches!(err, TracelensError::InvalidTrace { .. }));
    }

    #[test]
    fn test_analyze_multiple_rejects_empty() {
        let err = AnalysisEngine::new()
            .analyze_multiple_traces(&[], &AnalysisOptions::default())
            .unwrap_err();
        assert!(matches!(err, TracelensError::InvalidArgument { .. }));
    }

    #[test]
    fn test_batch_keeps_input_order() {
        let mut second = two_span_trace();
        second.trace_id = "u".to_string();
        for span in &mut second.spans {
            span.trace_id = "u".to_string();
            span.span_id = format!("u-{}", span.span_id);
            if let Some(p) = span.parent_span_id.as_mut() {
                *p = format!("u-{}", p);
            }
        }
        let mut broken = two_span_trace();
        broken.spans.clear();

        let results = AnalysisEngine::new().analyze_batch(
            &[two_span_trace(), broken, second],
            &AnalysisOptions::default(),
        );
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().graph.nodes.contains_key("root"));
        assert!(results[1].is_err());
        assert!(results[2].as_ref().unwrap().graph.nodes.contains_key("u-root"));
    }
}
