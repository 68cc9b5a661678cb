//! End-to-end scenarios and graph properties for tracelens-core.

use crate::*;
use serde_json::json;
use std::collections::HashSet;

fn span(id: &str, parent: Option<&str>, start: f64, end: f64) -> Span {
    let s = Span::new("trace-1", id, format!("op-{}", id), start).with_end(end);
    match parent {
        Some(p) => s.with_parent(p),
        None => s,
    }
}

fn trace(spans: Vec<Span>) -> Trace {
    Trace::from_spans("trace-1", spans).unwrap()
}

/// Linear chain of `n` back-to-back spans, 100ms each.
fn chain(n: usize) -> Trace {
    let spans = (0..n)
        .map(|i| {
            let parent = (i > 0).then(|| format!("span-{}", i - 1));
            let start = (i * 100) as f64;
            span(&format!("span-{}", i), parent.as_deref(), start, start + 100.0)
        })
        .collect();
    trace(spans)
}

/// Xorshift generator so property runs are reproducible.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

/// Random span tree with every child window nested in its parent's, on
/// integer microsecond boundaries.
fn random_trace(seed: u64, n: usize) -> Trace {
    let mut rng = Rng(seed.max(1));
    let mut windows: Vec<(u64, u64)> = vec![(0, 10_000)];
    let mut spans = vec![span("s0", None, 0.0, 10_000.0)];

    for i in 1..n {
        let parent = (rng.next() % i as u64) as usize;
        let (ps, pe) = windows[parent];
        let (start, end) = if pe - ps < 2 {
            (ps, pe)
        } else {
            let start = ps + rng.next() % ((pe - ps) / 2);
            (start, start + 1 + rng.next() % (pe - start))
        };
        windows.push((start, end));
        spans.push(span(
            &format!("s{}", i),
            Some(&format!("s{}", parent)),
            start as f64,
            end as f64,
        ));
    }
    trace(spans)
}

fn assert_valid_critical_path(graph: &DependencyGraph) {
    let path = &graph.critical_path;
    if graph.is_empty() {
        assert!(path.is_empty());
        return;
    }
    assert!(!path.is_empty(), "non-empty graph needs a critical path");
    assert!(graph.is_root(&path[0]), "critical path must start at a root");
    let unique: HashSet<&String> = path.iter().collect();
    assert_eq!(unique.len(), path.len(), "critical path repeats a node");
    for pair in path.windows(2) {
        assert!(
            graph.edge(&pair[0], &pair[1]).is_some(),
            "no edge {} -> {}",
            pair[0],
            pair[1]
        );
    }
}

// Scenario 1: one root, one child
#[test]
fn test_root_and_child() {
    let t = trace(vec![
        span("span-1", None, 0.0, 4000.0),
        span("span-2", Some("span-1"), 1000.0, 3000.0),
    ]);
    let g = build_graph(&t);

    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge_count(), 1);
    assert_eq!(g.critical_path, vec!["span-1", "span-2"]);
    assert_eq!(g.root_nodes, vec!["span-1"]);
    assert_eq!(g.total_duration, 4000.0);
}

// Scenario 2: 20-span chain, default options
#[test]
fn test_twenty_span_chain() {
    let engine = AnalysisEngine::new();
    let result = engine.analyze_trace(&chain(20), &AnalysisOptions::default()).unwrap();
    assert!(result.processing_time_ms < 2000);
    for path in &result.blocking_paths {
        assert!(path.impact_percentage >= 0.0);
    }

    // With only `calls` edges nothing blocks.
    let calls_only = AnalysisOptions::new().classify_blocking_edges(false);
    let result = engine.analyze_trace(&chain(20), &calls_only).unwrap();
    assert!(result.blocking_paths.is_empty());
    assert_eq!(result.performance_impact.bottleneck_impact, 0.0);
}

// Scenario 3: 100-span chain capped at 50 nodes
#[test]
fn test_hundred_span_chain_is_reduced() {
    let options = AnalysisOptions::new().optimize_graph(true).max_nodes(50);
    let result = AnalysisEngine::new().analyze_trace(&chain(100), &options).unwrap();

    assert_eq!(result.optimization.original_node_count, 100);
    assert!(result.optimization.optimized_node_count <= 50);
    assert!(!result.optimization.optimizations.is_empty());
    assert_valid_critical_path(&result.graph);
    assert!(result.graph.is_consistent());
}

// Scenario 4: graph summary of a nested pair
#[test]
fn test_graph_summary_nested_pair() {
    let t = trace(vec![
        span("root", None, 0.0, 300.0),
        span("child", Some("root"), 100.0, 200.0),
    ]);
    let engine = AnalysisEngine::new();
    let summary = engine.graph_summary(&build_graph(&t));

    assert_eq!(summary.node_count, 2);
    assert!(summary.depth > 1);
    assert_eq!(summary.max_node_duration, 300.0);
    assert_eq!(summary.average_node_duration, 200.0);
    assert_eq!(summary.critical_path_length, 2);
}

// Scenario 5: noise removal spares the critical path
#[test]
fn test_noise_removal_spares_critical_path() {
    let t = trace(vec![
        span("root", None, 0.0, 10_000.0),
        span("work", Some("root"), 0.0, 5_000.0),
        span("tail", Some("work"), 5_000.0, 5_005.0),
        span("noise", Some("root"), 6_000.0, 6_005.0),
    ]);
    let g = build_graph(&t);
    assert!(g.is_on_critical_path("tail"));
    assert!(!g.is_on_critical_path("noise"));

    let only_noise = OptimizeOptions::new()
        .merge_short_spans(false)
        .simplify_paths(false);
    let (optimized, result) = GraphOptimizer::new().optimize(&g, &only_noise);

    assert!(!optimized.nodes.contains_key("noise"));
    assert!(optimized.nodes.contains_key("tail"));
    assert_eq!(result.optimizations, vec!["Removed 1 noise nodes"]);
    // Input graph untouched.
    assert!(g.nodes.contains_key("noise"));
}

// Scenario 6: critical, exposed, on a path
#[cfg(feature = "security")]
#[test]
fn test_active_runtime_risk() {
    use chrono::{Duration, TimeZone, Utc};

    let t = trace(vec![
        span("root", None, 0.0, 100.0),
        Span::new("trace-1", "yaml", "yaml.load config", 10.0)
            .with_parent("root")
            .with_end(20.0),
    ]);
    let graph = build_graph(&t);
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let history = vec![ExecutionContext {
        trace_id: "trace-1".into(),
        span_ids: vec!["yaml".into()],
        operation_names: vec!["yaml.load config".into()],
        frequency: 12,
        last_seen: now - Duration::hours(3),
    }];
    let vuln = VulnerabilityMatch::new("CVE-2024-0001", "yaml", Severity::Critical, 9.0)
        .with_confidence(1.0);

    let risks = RuntimeRiskCalculator::new()
        .with_now(now)
        .calculate_runtime_risk(&[vuln], &graph, &history);

    assert_eq!(risks.len(), 1);
    assert!(risks[0].runtime_exposure);
    assert_eq!(risks[0].execution_paths, vec!["op-root → yaml.load config"]);
    assert_eq!(risks[0].risk_level, RiskLevel::Active);
    // round(90 * 1.5 * 1.1) = 149, capped.
    assert_eq!(risks[0].impact_score, 100.0);
}

// Property: critical path validity on built and optimized graphs
#[test]
fn test_critical_path_validity_random() {
    for seed in 1..40 {
        let t = random_trace(seed, 30);
        let g = build_graph(&t);
        assert_valid_critical_path(&g);

        let (optimized, _) = GraphOptimizer::new().optimize(&g, &OptimizeOptions::default());
        assert_valid_critical_path(&optimized);
        assert!(optimized.is_consistent(), "seed {}", seed);
    }
}

// Property: percentages stay within [0, 100] on well-formed traces,
// with and without optimization
#[test]
fn test_percentage_bounds_random() {
    let runs = [
        AnalysisOptions::new().optimize_graph(false).blocking_threshold(0.0),
        AnalysisOptions::new().blocking_threshold(0.0),
        AnalysisOptions::default(),
    ];
    for options in &runs {
        for seed in 1..40 {
            let result = AnalysisEngine::new()
                .analyze_trace(&random_trace(seed, 25), options)
                .unwrap();
            assert_percentages_bounded(&result, seed);
        }
    }
}

// Nested synchronous chain collapsed by the default pipeline
#[test]
fn test_nested_chain_blocking_bounded_after_simplify() {
    let spans = (0..10)
        .map(|i| {
            let parent = (i > 0).then(|| format!("n{}", i - 1));
            let inset = (i * 500) as f64;
            span(&format!("n{}", i), parent.as_deref(), inset, 10_000.0 - inset)
        })
        .collect();
    let t = trace(spans);
    let engine = AnalysisEngine::new();

    let blocking = |result: &AnalysisResult| -> Vec<(f64, f64)> {
        result
            .blocking_paths
            .iter()
            .map(|p| (p.blocking_duration, p.impact_percentage))
            .collect()
    };

    let raw = engine
        .analyze_trace(&t, &AnalysisOptions::new().optimize_graph(false))
        .unwrap();
    assert_eq!(blocking(&raw), vec![(9000.0, 90.0)]);

    let optimized = engine.analyze_trace(&t, &AnalysisOptions::default()).unwrap();
    let ids: Vec<&str> = optimized.graph.nodes.keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["n0", "simplified_n1_n9"]);
    assert_eq!(blocking(&optimized), vec![(9000.0, 90.0)]);
    assert_percentages_bounded(&optimized, 0);
}

fn assert_percentages_bounded(result: &AnalysisResult, seed: u64) {
    for path in &result.blocking_paths {
        assert!(
            (0.0..=100.0).contains(&path.impact_percentage),
            "seed {} path impact {}",
            seed,
            path.impact_percentage
        );
        for b in &path.bottlenecks {
            assert!(
                (0.0..=100.0).contains(&b.impact_percentage),
                "seed {} bottleneck {} impact {}",
                seed,
                b.node_id,
                b.impact_percentage
            );
        }
    }
    let impact = &result.performance_impact;
    assert!(impact.critical_path_impact >= 0.0);
    assert!(impact.parallelization_opportunity >= 0.0);
    assert!(impact.total_optimization_potential <= 80.0);
}

// Property: optimizer never grows the graph and honors the cap
#[test]
fn test_optimizer_monotonic_random() {
    for seed in 1..30 {
        let g = build_graph(&random_trace(seed, 60));
        for max in [5, 20, 100] {
            let opts = OptimizeOptions::new().max_nodes(Some(max));
            let (optimized, result) = GraphOptimizer::new().optimize(&g, &opts);
            assert!(result.optimized_node_count <= result.original_node_count);
            assert_eq!(result.optimized_node_count, optimized.node_count());
            if result.original_node_count > max {
                assert!(result.optimized_node_count <= max, "seed {} max {}", seed, max);
            }
        }
    }
}

// Property: a second optimization pass may change the graph again
#[test]
fn test_reoptimization_is_not_idempotent() {
    let t = trace(vec![
        span("root", None, 0.0, 10_000.0),
        span("a", Some("root"), 100.0, 110.0),
        span("b", Some("a"), 100.0, 110.0),
        span("c", Some("b"), 100.0, 110.0),
        span("d", Some("c"), 100.0, 110.0),
    ]);
    let g = build_graph(&t);
    let opts = OptimizeOptions::new().simplify_paths(false);

    let (once, first) = GraphOptimizer::new().optimize(&g, &opts);
    assert_eq!(first.optimizations, vec!["Merged 2 short spans"]);
    assert_eq!(once.node_count(), 3);

    let (twice, second) = GraphOptimizer::new().optimize(&once, &opts);
    assert_eq!(second.optimizations, vec!["Merged 1 short spans"]);
    assert_eq!(twice.node_count(), 2);
    assert_eq!(twice.nodes["a"].name, "op-a → op-b → op-c → op-d");
}

// Property: building is deterministic
#[test]
fn test_build_determinism_random() {
    for seed in 1..20 {
        let t = random_trace(seed, 40);
        let first = build_graph(&t);
        let second = build_graph(&t);
        assert_eq!(first, second);

        let mut reversed = t.clone();
        reversed.spans.reverse();
        assert_eq!(build_graph(&reversed).critical_path, first.critical_path);
    }
}

// Integration: JSON in, report out
#[test]
fn test_json_to_report_pipeline() {
    let raw = json!({
        "traceId": "trace-1",
        "spans": [
            {"traceId": "trace-1", "spanId": "r", "operationName": "HTTP GET /cart",
             "startTime": 1_000, "endTime": 9_000, "tags": {"http.url": "/cart"}},
            {"traceId": "trace-1", "spanId": "q", "parentSpanId": "r",
             "operationName": "load cart", "startTime": 1_500, "endTime": 6_000,
             "tags": {"db.type": "postgres"}, "status": {"code": "OK"}},
            {"traceId": "trace-1", "spanId": "f", "parentSpanId": "r",
             "operationName": "read template file", "startTime": 6_000, "endTime": 8_500}
        ]
    });
    let t = TraceNormalizer::new().normalize_trace(&raw).unwrap();
    let result = AnalysisEngine::new()
        .analyze_trace(&t, &AnalysisOptions::default())
        .unwrap();

    // Sequential siblings block their parent.
    assert_eq!(result.graph.edges["r->q"].edge_type, EdgeType::Blocks);
    assert_eq!(result.graph.edges["r->f"].edge_type, EdgeType::Blocks);
    assert_eq!(result.blocking_paths.len(), 2);
    assert_eq!(result.blocking_paths[0].path, vec!["r", "q"]);

    let types: HashSet<BottleneckType> = result
        .blocking_paths
        .iter()
        .flat_map(|p| p.bottlenecks.iter().map(|b| b.bottleneck_type))
        .collect();
    assert!(types.contains(&BottleneckType::Database));
    assert!(types.contains(&BottleneckType::Network));
    assert!(types.contains(&BottleneckType::Io));

    let text = render_plain(&result);
    assert!(text.contains("CRITICAL PATH: HTTP GET /cart -> load cart"));
}

#[test]
fn test_multiple_traces_merge_by_id() {
    let a = Trace::from_spans(
        "t-a",
        vec![
            Span::new("t-a", "gw", "gateway", 0.0).with_end(1000.0),
            Span::new("t-a", "svc", "service", 100.0).with_parent("gw").with_end(900.0),
        ],
    )
    .unwrap();
    let b = Trace::from_spans(
        "t-b",
        vec![
            Span::new("t-b", "gw", "gateway", 50.0).with_end(2050.0),
            Span::new("t-b", "svc", "service", 200.0).with_parent("gw").with_end(1500.0),
        ],
    )
    .unwrap();

    let result = AnalysisEngine::new()
        .analyze_multiple_traces(&[a, b], &AnalysisOptions::new().optimize_graph(false))
        .unwrap();
    let g = &result.graph;
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.total_duration, 2000.0);
    assert_eq!(g.nodes["gw"].start_time, 0.0);
    assert_eq!(g.nodes["gw"].end_time, Some(2050.0));
    // (800 + 1300) / 2
    assert_eq!(g.edges["gw->svc"].weight, 1050.0);
}

#[test]
fn test_config_drives_analysis() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("tracelens.toml"),
        "[analysis]\noptimize_graph = false\ninclude_recommendations = false\n",
    )
    .unwrap();
    let options = load_config(dir.path()).unwrap().unwrap().analysis_options();

    let result = AnalysisEngine::new().analyze_trace(&chain(20), &options).unwrap();
    assert_eq!(result.graph.node_count(), 20);
    assert!(result.optimization.optimizations.is_empty());
    assert!(result.recommendations.is_empty());
}

#[test]
fn test_scan_and_batch() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..4 {
        let raw = json!({
            "traceId": format!("t{}", i),
            "spans": [{"traceId": format!("t{}", i), "spanId": "a",
                       "operationName": "job", "startTime": 1, "endTime": 10 + i}]
        });
        std::fs::write(dir.path().join(format!("t{}.json", i)), raw.to_string()).unwrap();
    }
    let files = gather_trace_files(dir.path()).unwrap();
    let traces = load_traces(&files).unwrap();
    let results = AnalysisEngine::new().analyze_batch(&traces, &AnalysisOptions::default());

    assert_eq!(results.len(), 4);
    for (i, r) in results.iter().enumerate() {
        let r = r.as_ref().unwrap();
        assert_eq!(r.graph.total_duration, (9 + i) as f64);
    }
}

#[cfg(feature = "dot")]
#[test]
fn test_dot_export_of_analysis() {
    let result = AnalysisEngine::new()
        .analyze_trace(&chain(3), &AnalysisOptions::new().optimize_graph(false))
        .unwrap();
    let dot = generate_dot(&result.graph);
    assert!(dot.contains("\"span-0\" -> \"span-1\""));
    assert_eq!(dot.matches("fillcolor=orange").count(), 3);
}

#[test]
fn test_logging_does_not_panic() {
    init_structured_logging();
    log_info("scenario suite");
    log_event("WARN", "scenario suite");
}
