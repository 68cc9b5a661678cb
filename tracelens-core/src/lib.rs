//! tracelens-core: trace analysis engine.
//!
//! Turns distributed-tracing spans into a dependency graph and answers
//! where the time went: the critical path, blocking paths and their
//! bottlenecks, how much could be won by parallelizing siblings, and which
//! known-vulnerable packages actually sit on live execution paths.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tracelens_core::prelude::*;
//!
//! let trace = TraceNormalizer::new().normalize_trace(&json)?;
//! let result = AnalysisEngine::new().analyze_trace(&trace, &AnalysisOptions::default())?;
//!
//! for rec in &result.recommendations {
//!     println!("{}", rec);
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`trace`]: span and trace model
//! - [`normalize`]: validation of loosely-typed span JSON (native and OTLP)
//! - [`graph`]: dependency graph model, builder and critical path
//! - [`optimizer`]: noise removal, span merging, chain simplification, node caps
//! - [`analyzers`]: blocking paths, bottlenecks, performance impact
//! - [`engine`]: the analysis pipeline and graph summaries
//! - [`scan`]: parallel discovery and loading of trace files
//! - [`error`]: typed error handling
//!
//! # Cargo Features
//!
//! - `dot` (default): Graphviz DOT and JSON graph export
//! - `security` (default): runtime risk scoring of vulnerability matches
//! - `full`: Enable all optional features

pub mod analyzers;
pub mod common;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
pub mod normalize;
pub mod optimizer;
pub mod prelude;
pub mod report;
pub mod scan;
pub mod trace;

pub use common::GraphTraversal;

#[cfg(feature = "dot")]
pub mod visualize;

#[cfg(feature = "security")]
pub mod security;

// ============================================================================
// Explicit Re-exports
// ============================================================================

pub use error::{IoResultExt, TracelensError, TracelensResult};

pub use trace::{Span, SpanLog, SpanStatus, TagValue, Tags, Trace};

pub use normalize::TraceNormalizer;

pub use graph::{
    build_graph, contains_cycle, critical_path, edge_key, DependencyGraph, EdgeType, GraphBuilder,
    GraphEdge, GraphNode, Metadata, NodeType,
};

pub use optimizer::{GraphOptimizer, OptimizationResult, OptimizeOptions};

pub use analyzers::{
    BlockingPath, BlockingPathAnalyzer, Bottleneck, BottleneckType, ImpactCalculator,
    PerformanceImpact,
};

pub use engine::{
    recommendations, AnalysisEngine, AnalysisOptions, AnalysisResult, GraphSummary,
};

pub use config::{load_config, TracelensConfig};

pub use logging::{init_structured_logging, log_error, log_event, log_info, log_warn};

pub use report::{print_json, print_plain, print_summary, render_plain, render_summary};

pub use scan::{gather_trace_files, load_trace_file, load_traces, read_json};

#[cfg(feature = "dot")]
pub use visualize::{generate_dot, graph_to_json};

#[cfg(feature = "security")]
pub use security::{
    apply_filters, basic_risks, summarize, ExecutionContext, RiskLevel, RuntimeRisk,
    RuntimeRiskCalculator, ScanOptions, ScanSummary, Severity, VulnerabilityMatch,
};

#[cfg(test)]
mod tests;
