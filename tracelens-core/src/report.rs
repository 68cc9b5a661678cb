//! Output formatting - plaintext and JSON.

use serde::Serialize;
use std::fmt::Write;

use crate::engine::{AnalysisResult, GraphSummary};
use crate::graph::DependencyGraph;

/// Paths listed in the plain report; JSON output carries all of them.
const MAX_LISTED_PATHS: usize = 5;

/// Plain-text analysis report.
pub fn render_plain(result: &AnalysisResult) -> String {
    let mut out = String::with_capacity(1024);
    // Writing to a String cannot fail.
    let _ = write_plain(&mut out, result);
    out
}

fn write_plain(out: &mut String, result: &AnalysisResult) -> std::fmt::Result {
    let graph = &result.graph;
    writeln!(
        out,
        "GRAPH: {} nodes, {} edges, total {:.1}",
        graph.node_count(),
        graph.edge_count(),
        graph.total_duration
    )?;
    writeln!(out, "CRITICAL PATH: {}", critical_path_names(graph))?;

    let impact = &result.performance_impact;
    writeln!(out, "IMPACT:")?;
    writeln!(out, "- critical path: {:.1}%", impact.critical_path_impact)?;
    writeln!(out, "- bottlenecks: {:.1}%", impact.bottleneck_impact)?;
    writeln!(out, "- parallelization: {:.1}%", impact.parallelization_opportunity)?;
    writeln!(
        out,
        "- optimization potential: {:.1}%",
        impact.total_optimization_potential
    )?;

    if result.blocking_paths.is_empty() {
        writeln!(out, "No blocking paths found.")?;
    } else {
        writeln!(out, "BLOCKING PATHS ({}):", result.blocking_paths.len())?;
        for path in result.blocking_paths.iter().take(MAX_LISTED_PATHS) {
            writeln!(
                out,
                "- {:.1}% {}",
                path.impact_percentage,
                path.path.join(" -> ")
            )?;
            for b in &path.bottlenecks {
                writeln!(
                    out,
                    "    {} [{}] {:.1}%",
                    b.name,
                    b.bottleneck_type.as_str(),
                    b.impact_percentage
                )?;
            }
        }
    }

    let opt = &result.optimization;
    if !opt.optimizations.is_empty() {
        writeln!(
            out,
            "OPTIMIZED: {} -> {} nodes ({})",
            opt.original_node_count,
            opt.optimized_node_count,
            opt.optimizations.join("; ")
        )?;
    }

    if !result.recommendations.is_empty() {
        writeln!(out, "RECOMMENDATIONS ({}):", result.recommendations.len())?;
        for rec in &result.recommendations {
            writeln!(out, "- {}", rec)?;
        }
    }
    writeln!(out, "Processed in {} ms.", result.processing_time_ms)
}

fn critical_path_names(graph: &DependencyGraph) -> String {
    if graph.critical_path.is_empty() {
        return "(empty)".to_string();
    }
    graph
        .critical_path
        .iter()
        .map(|id| graph.nodes.get(id).map_or(id.as_str(), |n| n.name.as_str()))
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub fn render_summary(summary: &GraphSummary) -> String {
    format!(
        "nodes: {}\nedges: {}\ndepth: {}\ncritical path length: {}\naverage node duration: {:.1}\nmax node duration: {:.1}\n",
        summary.node_count,
        summary.edge_count,
        summary.depth,
        summary.critical_path_length,
        summary.average_node_duration,
        summary.max_node_duration
    )
}

pub fn print_plain(result: &AnalysisResult) {
    print!("{}", render_plain(result));
}

pub fn print_summary(summary: &GraphSummary) {
    print!("{}", render_summary(summary));
}

/// Prints any report value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            tracing::error!(error = %e, "JSON serialization failed");
            println!("{{\"error\": {:?}}}", e.to_string());
        }
    }
}

#[cfg(feature = "security")]
pub use self::risk_report::{print_risks, render_risks};

#[cfg(feature = "security")]
mod risk_report {
    use super::*;
    use crate::security::{RuntimeRisk, ScanSummary};

    pub fn render_risks(risks: &[RuntimeRisk], summary: &ScanSummary) -> String {
        let mut out = String::new();
        let _ = write_risks(&mut out, risks, summary);
        out
    }

    fn write_risks(
        out: &mut String,
        risks: &[RuntimeRisk],
        summary: &ScanSummary,
    ) -> std::fmt::Result {
        writeln!(
            out,
            "RISK SUMMARY: {} critical, {} high, {} medium, {} low ({} active, {} theoretical)",
            summary.critical,
            summary.high,
            summary.medium,
            summary.low,
            summary.active_risks,
            summary.theoretical_risks
        )?;
        if risks.is_empty() {
            return writeln!(out, "No runtime risks found.");
        }
        for risk in risks {
            writeln!(
                out,
                "- {} {} [{} / {}] score {:.0}",
                risk.cve_id, risk.package_name, risk.severity, risk.risk_level, risk.impact_score
            )?;
            for path in &risk.execution_paths {
                writeln!(out, "    path: {}", path)?;
            }
            for rec in &risk.recommendations {
                writeln!(out, "    * {}", rec)?;
            }
        }
        Ok(())
    }

    pub fn print_risks(risks: &[RuntimeRisk], summary: &ScanSummary) {
        print!("{}", render_risks(risks, summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AnalysisEngine, AnalysisOptions};
    use crate::trace::{Span, Trace};

    fn result() -> AnalysisResult {
        let spans = vec![
            Span::new("t", "root", "GET /orders", 0.0).with_end(1000.0),
            Span::new("t", "db", "db.query orders", 100.0)
                .with_end(900.0)
                .with_parent("root"),
        ];
        let trace = Trace::from_spans("t", spans).unwrap();
        AnalysisEngine::new()
            .analyze_trace(&trace, &AnalysisOptions::default())
            .unwrap()
    }

    #[test]
    fn test_render_plain() {
        let text = render_plain(&result());
        assert!(text.contains("GRAPH: 2 nodes, 1 edges"));
        assert!(text.contains("CRITICAL PATH: GET /orders -> db.query orders"));
        assert!(text.contains("BLOCKING PATHS (1):"));
        assert!(text.contains("db.query orders [database]"));
    }

    #[test]
    fn test_render_summary() {
        let r = result();
        let summary = AnalysisEngine::new().graph_summary(&r.graph);
        let text = render_summary(&summary);
        assert!(text.contains("nodes: 2"));
        assert!(text.contains("depth: 2"));
    }

    #[test]
    fn test_result_is_json_serializable() {
        let json = serde_json::to_value(result()).unwrap();
        assert!(json["graph"]["criticalPath"].is_array());
        assert!(json["performanceImpact"]["criticalPathImpact"].is_number());
    }
}
