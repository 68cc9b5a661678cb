//! Runtime risk scoring.
//!
//! Performance characteristics:
//! - One compiled pattern per vulnerability, applied to every node: O(V * N)
//! - Path strings come from a BFS per matching node: O(N + E) each

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::debug;

use crate::common::GraphTraversal;
use crate::graph::{DependencyGraph, GraphNode};

use super::{ExecutionContext, RiskLevel, RuntimeRisk, Severity, VulnerabilityMatch};

pub const DEFAULT_EXPOSURE_WINDOW_DAYS: i64 = 7;
pub const MAX_RISK_RECOMMENDATIONS: usize = 6;

const EXPOSURE_MULTIPLIER: f64 = 1.5;
const PATH_BONUS_PER_PATH: f64 = 0.1;
const MAX_PATH_BONUS: f64 = 0.5;
const NAMED_PATHS: usize = 2;

/// Correlates vulnerability matches with a dependency graph and recent
/// execution history.
#[derive(Debug, Clone)]
pub struct RuntimeRiskCalculator {
    now: Option<DateTime<Utc>>,
    exposure_window: Duration,
}

impl Default for RuntimeRiskCalculator {
    fn default() -> Self {
        Self {
            now: None,
            exposure_window: Duration::days(DEFAULT_EXPOSURE_WINDOW_DAYS),
        }
    }
}

impl RuntimeRiskCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the reference clock instead of reading the system time.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_exposure_window(mut self, window: Duration) -> Self {
        self.exposure_window = window;
        self
    }

    pub fn with_exposure_days(self, days: i64) -> Self {
        self.with_exposure_window(Duration::days(days))
    }

    /// Score every vulnerability against the graph and history, highest
    /// impact first.
    pub fn calculate_runtime_risk(
        &self,
        vulnerabilities: &[VulnerabilityMatch],
        graph: &DependencyGraph,
        history: &[ExecutionContext],
    ) -> Vec<RuntimeRisk> {
        let cutoff = self.now.unwrap_or_else(Utc::now) - self.exposure_window;

        let mut risks: Vec<RuntimeRisk> = vulnerabilities
            .iter()
            .map(|vuln| {
                let paths = execution_paths(&vuln.package_name, graph);
                let exposed = has_runtime_exposure(&vuln.package_name, history, cutoff);
                let risk_level = RiskLevel::assess(exposed, !paths.is_empty(), vuln.severity);
                debug!(
                    cve = %vuln.cve_id,
                    package = %vuln.package_name,
                    paths = paths.len(),
                    exposed,
                    level = %risk_level,
                    "runtime risk assessed"
                );
                RuntimeRisk {
                    cve_id: vuln.cve_id.clone(),
                    package_name: vuln.package_name.clone(),
                    severity: vuln.severity,
                    runtime_exposure: exposed,
                    impact_score: impact_score(vuln, exposed, paths.len()),
                    risk_level,
                    recommendations: recommendations(vuln, risk_level, &paths),
                    execution_paths: paths,
                }
            })
            .collect();

        risks.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score));
        risks
    }
}

/// Case-insensitive patterns for a package name: verbatim, and with `-`/`_`
/// treated as optional separators (`lodash-merge` also finds `lodashmerge`).
fn package_patterns(package: &str) -> Vec<Regex> {
    let mut patterns = Vec::with_capacity(2);
    if package.is_empty() {
        return patterns;
    }
    if let Ok(exact) = Regex::new(&format!("(?i){}", regex::escape(package))) {
        patterns.push(exact);
    }
    let loose: Vec<String> = package
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| regex::escape(&c.to_string()))
        .collect();
    if !loose.is_empty() {
        if let Ok(re) = Regex::new(&format!("(?i){}", loose.join("[-_]*"))) {
            patterns.push(re);
        }
    }
    patterns
}

fn references_package(node: &GraphNode, patterns: &[Regex]) -> bool {
    let metadata = serde_json::to_string(&node.metadata).unwrap_or_default();
    patterns
        .iter()
        .any(|re| re.is_match(&node.name) || re.is_match(&metadata))
}

/// Human-readable root paths (`"a → b → c"`), one per node that mentions
/// `package`. Unreachable matches are reported by name alone.
fn execution_paths(package: &str, graph: &DependencyGraph) -> Vec<String> {
    let patterns = package_patterns(package);
    if patterns.is_empty() {
        return Vec::new();
    }

    let mut paths = Vec::new();
    for node in graph.nodes.values() {
        if !references_package(node, &patterns) {
            continue;
        }
        let rendered = match graph.path_from(graph.root_nodes.iter().cloned(), &node.id) {
            Some(ids) => ids
                .iter()
                .map(|id| graph.nodes.get(id).map_or(id.as_str(), |n| n.name.as_str()))
                .collect::<Vec<_>>()
                .join(" → "),
            None => node.name.clone(),
        };
        paths.push(rendered);
    }
    paths
}

fn has_runtime_exposure(package: &str, history: &[ExecutionContext], cutoff: DateTime<Utc>) -> bool {
    if package.is_empty() {
        return false;
    }
    let needle = package.to_lowercase();
    history.iter().any(|ctx| {
        ctx.last_seen > cutoff
            && ctx
                .operation_names
                .iter()
                .any(|op| op.to_lowercase().contains(&needle))
    })
}

fn impact_score(vuln: &VulnerabilityMatch, exposed: bool, path_count: usize) -> f64 {
    let mut score = vuln.score * 10.0;
    if exposed {
        score *= EXPOSURE_MULTIPLIER;
    }
    if path_count > 0 {
        score *= 1.0 + (path_count as f64 * PATH_BONUS_PER_PATH).min(MAX_PATH_BONUS);
    }
    score *= vuln.severity.multiplier();
    score *= vuln.match_confidence;
    score.round().clamp(0.0, 100.0)
}

fn recommendations(vuln: &VulnerabilityMatch, level: RiskLevel, paths: &[String]) -> Vec<String> {
    let mut recs = Vec::new();

    match vuln.latest_fix() {
        Some(version) => recs.push(format!(
            "Update {} to version {} or later",
            vuln.package_name, version
        )),
        None => recs.push(format!("Monitor {} for security updates", vuln.package_name)),
    }

    let urgency: [&str; 2] = match level {
        RiskLevel::Active => [
            "URGENT: This vulnerability is actively exploitable in your runtime",
            "Consider temporarily disabling affected functionality if possible",
        ],
        RiskLevel::Likely => [
            "HIGH PRIORITY: This vulnerability affects runtime execution paths",
            "Plan immediate update or mitigation",
        ],
        RiskLevel::Possible => [
            "MEDIUM PRIORITY: Potential runtime exposure detected",
            "Include in next maintenance cycle",
        ],
        RiskLevel::Theoretical => [
            "LOW PRIORITY: No runtime exposure detected",
            "Update during regular dependency maintenance",
        ],
    };
    recs.extend(urgency.iter().map(|s| s.to_string()));

    if !paths.is_empty() {
        let named: Vec<&str> = paths.iter().take(NAMED_PATHS).map(String::as_str).collect();
        recs.push(format!("Review execution paths: {}", named.join(", ")));
        if paths.len() > NAMED_PATHS {
            recs.push(format!(
                "And {} other execution paths",
                paths.len() - NAMED_PATHS
            ));
        }
    }

    if vuln.severity == Severity::Critical {
        recs.push("Consider implementing additional security controls".to_string());
        recs.push("Monitor for exploitation attempts".to_string());
    }

    recs.truncate(MAX_RISK_RECOMMENDATIONS);
    recs
}
