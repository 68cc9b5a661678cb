//! tracelens CLI - critical paths, bottlenecks and runtime CVE risk from
//! distributed traces.
//!
//! Features:
//! - Trace discovery from a file or directory (native JSON or OTLP/JSON)
//! - Rayon-powered parallel loading and per-trace analysis
//! - Merged multi-trace analysis
//! - Graphviz DOT export
//! - Runtime risk scoring of vulnerability matches

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use tracelens_core::{
    apply_filters, gather_trace_files, generate_dot, graph_to_json, init_structured_logging,
    load_config, load_traces, log_info, log_warn, print_json, print_plain, print_summary, read_json, report,
    summarize, AnalysisEngine, AnalysisOptions, AnalysisResult, DependencyGraph,
    ExecutionContext, GraphBuilder, RuntimeRiskCalculator, ScanOptions, Severity, Trace,
    TracelensConfig, VulnerabilityMatch,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Trace analyzer: critical paths, bottlenecks and runtime CVE risk")]
pub struct Cli {
    /// Trace file, or directory searched recursively for *.json traces
    #[arg(default_value = ".")]
    path: String,

    /// Merge all traces into one graph before analyzing
    #[arg(long)]
    multi: bool,

    /// Output results in JSON format
    #[arg(long)]
    json: bool,

    /// Print the dependency graph in Graphviz DOT format
    #[arg(long)]
    dot: bool,

    /// Write the DOT graph to a file
    #[arg(long, value_name = "FILE")]
    dot_file: Option<String>,

    /// Write the graph as JSON (nodes, edges, stats) to a file
    #[arg(long, value_name = "FILE")]
    graph_json: Option<String>,

    /// Print graph statistics instead of the full report
    #[arg(long)]
    summary: bool,

    /// Analyze the raw graph without optimization passes
    #[arg(long)]
    no_optimize: bool,

    /// Keep at most N nodes when optimizing
    #[arg(long, value_name = "N")]
    max_nodes: Option<usize>,

    /// Minimum blocking share for reported paths (0.0 - 1.0)
    #[arg(long, value_name = "F")]
    threshold: Option<f64>,

    /// Stop path enumeration after N root-to-leaf paths
    #[arg(long, value_name = "N")]
    max_paths: Option<usize>,

    /// Skip rule-based recommendations
    #[arg(long)]
    no_recommendations: bool,

    /// Score vulnerability matches (JSON array) against the traces
    #[arg(long, value_name = "VULNS.json")]
    risk: Option<PathBuf>,

    /// Recent execution history (JSON array) for runtime exposure
    #[arg(long, value_name = "HISTORY.json", requires = "risk")]
    history: Option<PathBuf>,

    /// Include risks with no runtime evidence
    #[arg(long, requires = "risk")]
    include_theoretical: bool,

    /// Drop risks below this severity (LOW, MEDIUM, HIGH, CRITICAL)
    #[arg(long, value_name = "S", requires = "risk")]
    min_severity: Option<String>,

    /// Report at most N risks
    #[arg(long, value_name = "N", requires = "risk")]
    max_results: Option<usize>,

    /// Days of history that count as runtime exposure
    #[arg(long, value_name = "DAYS", requires = "risk")]
    exposure_days: Option<i64>,
}

/// Validates output file paths.
///
/// Rejects absolute paths, `..` components and NUL bytes.
fn validate_output_path(path: &str) -> Result<PathBuf> {
    if path.contains('\0') {
        return Err(anyhow!("Output path contains null bytes"));
    }

    let p = PathBuf::from(path);
    if p.is_absolute() {
        return Err(anyhow!(
            "Output path must be relative, not absolute: {}",
            path
        ));
    }
    if p
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(anyhow!(
            "Path traversal (..) not allowed in output paths: {}",
            path
        ));
    }
    Ok(p)
}

/// Directory searched for tracelens.toml.
fn config_dir(path: &Path) -> PathBuf {
    if path.is_file() {
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    } else {
        path.to_path_buf()
    }
}

/// Defaults, then config, then flags.
fn analysis_options(cli: &Cli, config: Option<&TracelensConfig>) -> Result<AnalysisOptions> {
    let mut options = config.map(TracelensConfig::analysis_options).unwrap_or_default();
    if cli.no_optimize {
        options.optimize_graph = false;
    }
    if cli.max_nodes.is_some() {
        options.max_nodes = cli.max_nodes;
    }
    if cli.threshold.is_some() {
        options.blocking_threshold = cli.threshold;
    }
    if let Some(max) = cli.max_paths {
        options.max_paths = max;
    }
    if cli.no_recommendations {
        options.include_recommendations = false;
    }
    options.validate()?;
    Ok(options)
}

fn scan_options(cli: &Cli, config: Option<&TracelensConfig>) -> Result<ScanOptions> {
    let mut options = match config {
        Some(cfg) => cfg.scan_options()?,
        None => ScanOptions::default(),
    };
    if cli.include_theoretical {
        options.include_theoretical = true;
    }
    if let Some(s) = &cli.min_severity {
        options.min_severity = Some(s.parse::<Severity>()?);
    }
    if cli.max_results.is_some() {
        options.max_results = cli.max_results;
    }
    Ok(options)
}

/// One analysis per trace, or one merged analysis with `--multi`.
fn analyze(
    traces: &[Trace],
    multi: bool,
    options: &AnalysisOptions,
) -> Result<Vec<(String, AnalysisResult)>> {
    let engine = AnalysisEngine::new();
    if multi {
        let result = engine
            .analyze_multiple_traces(traces, options)
            .context("Failed to analyze merged traces")?;
        return Ok(vec![("merged".to_string(), result)]);
    }

    let mut results = Vec::with_capacity(traces.len());
    for (trace, result) in traces.iter().zip(engine.analyze_batch(traces, options)) {
        match result {
            Ok(r) => results.push((trace.trace_id.clone(), r)),
            Err(e) if e.is_recoverable() => {
                log_warn(&format!("skipping trace {}: {}", trace.trace_id, e));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(results)
}

fn print_results(results: &[(String, AnalysisResult)], cli: &Cli, json: bool) {
    let engine = AnalysisEngine::new();
    if json {
        let items: Vec<serde_json::Value> = results
            .iter()
            .map(|(id, r)| {
                if cli.summary {
                    json!({ "traceId": id, "summary": engine.graph_summary(&r.graph) })
                } else {
                    json!({ "traceId": id, "result": r })
                }
            })
            .collect();
        print_json(&items);
        return;
    }

    for (id, r) in results {
        println!("=== {} ===", id);
        if cli.summary {
            print_summary(&engine.graph_summary(&r.graph));
        } else {
            print_plain(r);
        }
        println!();
    }
}

fn write_exports(results: &[(String, AnalysisResult)], cli: &Cli) -> Result<()> {
    if cli.dot {
        for (_, r) in results {
            print!("{}", generate_dot(&r.graph));
        }
    }

    if let Some(file) = &cli.dot_file {
        let path = validate_output_path(file)?;
        // Graphviz accepts several digraphs in one file.
        let dot: String = results.iter().map(|(_, r)| generate_dot(&r.graph)).collect();
        fs::write(&path, dot)
            .with_context(|| format!("Failed to write DOT file {}", path.display()))?;
        eprintln!("DOT graph written to {}", path.display());
    }

    if let Some(file) = &cli.graph_json {
        let path = validate_output_path(file)?;
        let graphs: Vec<serde_json::Value> = results
            .iter()
            .map(|(id, r)| json!({ "traceId": id, "graph": graph_to_json(&r.graph) }))
            .collect();
        fs::write(&path, serde_json::to_string_pretty(&graphs)?)
            .with_context(|| format!("Failed to write graph JSON {}", path.display()))?;
        eprintln!("Graph JSON written to {}", path.display());
    }
    Ok(())
}

fn run_risk(
    vulns_path: &Path,
    traces: &[Trace],
    cli: &Cli,
    config: Option<&TracelensConfig>,
    json: bool,
) -> Result<()> {
    let vulns: Vec<VulnerabilityMatch> = read_json(vulns_path)
        .with_context(|| format!("Failed to read vulnerabilities from {}", vulns_path.display()))?;
    let history: Vec<ExecutionContext> = match &cli.history {
        Some(p) => read_json(p)
            .with_context(|| format!("Failed to read execution history from {}", p.display()))?,
        None => Vec::new(),
    };

    // Risk matching wants every original span name, so no optimization here.
    let graph: DependencyGraph = GraphBuilder::new().build_from_multiple_traces(traces);

    let mut calculator = RuntimeRiskCalculator::new();
    if let Some(days) = cli
        .exposure_days
        .or_else(|| config.and_then(TracelensConfig::exposure_window_days))
    {
        calculator = calculator.with_exposure_days(days);
    }

    let risks = calculator.calculate_runtime_risk(&vulns, &graph, &history);
    let summary = summarize(&risks);
    let shown = apply_filters(risks, &scan_options(cli, config)?);

    if json {
        print_json(&json!({ "summary": summary, "risks": shown }));
    } else {
        report::print_risks(&shown, &summary);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let root = Path::new(&cli.path);
    let config = load_config(&config_dir(root))?;
    let options = analysis_options(cli, config.as_ref())?;
    let json = cli.json || config.as_ref().is_some_and(TracelensConfig::wants_json);

    let files = gather_trace_files(root)?;
    if files.is_empty() {
        bail!("No trace files found under {}", root.display());
    }
    let traces = load_traces(&files).context("Failed to load traces")?;
    if traces.is_empty() {
        bail!("No valid traces found in {} files", files.len());
    }
    log_info(&format!("loaded {} traces from {} files", traces.len(), files.len()));

    if let Some(vulns) = &cli.risk {
        return run_risk(vulns, &traces, cli, config.as_ref(), json);
    }

    let results = analyze(&traces, cli.multi, &options)?;
    if !cli.dot {
        print_results(&results, cli, json);
    }
    write_exports(&results, cli)
}

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] tracelens internal error: {}", info);
        eprintln!("[PANIC] The process will exit with code 101.");
    }));

    init_structured_logging();

    let cli = Cli::parse();
    run(&cli)
}
