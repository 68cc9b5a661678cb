//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use tracelens_core::prelude::*;
//! ```
//!
//! Covers the usual load → analyze → report flow.

pub use crate::error::{TracelensError, TracelensResult};
pub use crate::trace::{Span, SpanStatus, Trace};
pub use crate::normalize::TraceNormalizer;

pub use crate::graph::{build_graph, DependencyGraph, GraphBuilder};
pub use crate::common::GraphTraversal;

pub use crate::engine::{AnalysisEngine, AnalysisOptions, AnalysisResult, GraphSummary};
pub use crate::optimizer::{GraphOptimizer, OptimizeOptions};

pub use crate::scan::{gather_trace_files, load_traces};
pub use crate::config::{load_config, TracelensConfig};

#[cfg(feature = "security")]
pub use crate::security::{ExecutionContext, RuntimeRiskCalculator, VulnerabilityMatch};
