//! Filtering and aggregation of runtime risks for scan reports.

use serde::{Deserialize, Serialize};

use super::{RiskLevel, RuntimeRisk, Severity, VulnerabilityMatch};

/// Report filters applied after scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanOptions {
    /// Keep THEORETICAL risks (dropped by default).
    pub include_theoretical: bool,
    pub min_severity: Option<Severity>,
    pub max_results: Option<usize>,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_theoretical(mut self, include: bool) -> Self {
        self.include_theoretical = include;
        self
    }

    pub fn min_severity(mut self, severity: Option<Severity>) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn max_results(mut self, max: Option<usize>) -> Self {
        self.max_results = max;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// ACTIVE and LIKELY risks.
    pub active_risks: usize,
    pub theoretical_risks: usize,
}

impl ScanSummary {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// Drop risks the report should not show. Order is preserved, so the
/// `max_results` cut keeps the highest-impact entries of a sorted list.
pub fn apply_filters(risks: Vec<RuntimeRisk>, options: &ScanOptions) -> Vec<RuntimeRisk> {
    let mut kept: Vec<RuntimeRisk> = risks
        .into_iter()
        .filter(|r| options.include_theoretical || r.risk_level != RiskLevel::Theoretical)
        .filter(|r| options.min_severity.map_or(true, |min| r.severity >= min))
        .collect();
    if let Some(max) = options.max_results {
        kept.truncate(max);
    }
    kept
}

pub fn summarize(risks: &[RuntimeRisk]) -> ScanSummary {
    let mut summary = ScanSummary::default();
    for risk in risks {
        match risk.severity {
            Severity::Critical => summary.critical += 1,
            Severity::High => summary.high += 1,
            Severity::Medium => summary.medium += 1,
            Severity::Low => summary.low += 1,
        }
        match risk.risk_level {
            RiskLevel::Active | RiskLevel::Likely => summary.active_risks += 1,
            RiskLevel::Theoretical => summary.theoretical_risks += 1,
            RiskLevel::Possible => {}
        }
    }
    summary
}

/// Graph-less fallback: score matches on CVSS and confidence alone.
pub fn basic_risks(vulnerabilities: &[VulnerabilityMatch]) -> Vec<RuntimeRisk> {
    vulnerabilities
        .iter()
        .map(|v| RuntimeRisk {
            cve_id: v.cve_id.clone(),
            package_name: v.package_name.clone(),
            severity: v.severity,
            runtime_exposure: false,
            execution_paths: Vec::new(),
            impact_score: (v.score * 10.0 * v.match_confidence).round().clamp(0.0, 100.0),
            risk_level: RiskLevel::Theoretical,
            recommendations: vec![
                format!("Update {} to a fixed version", v.package_name),
                "Monitor for security updates".to_string(),
                "Review dependency usage in codebase".to_string(),
            ],
        })
        .collect()
}
