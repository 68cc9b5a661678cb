//! Runtime vulnerability risk: which vulnerable packages show up on real
//! execution paths, and how urgent that makes them.
//!
//! Vulnerability matches come from an external matcher; this module only
//! correlates them with a [`DependencyGraph`](crate::graph::DependencyGraph)
//! and recent execution history.

mod risk;
mod summary;

pub use risk::{RuntimeRiskCalculator, DEFAULT_EXPOSURE_WINDOW_DAYS, MAX_RISK_RECOMMENDATIONS};
pub use summary::{apply_filters, basic_risks, summarize, ScanOptions, ScanSummary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::TracelensError;

/// CVSS-style severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Weight applied to the impact score.
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.8,
            Self::Medium => 0.6,
            Self::Low => 0.4,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = TracelensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(TracelensError::invalid_argument(format!(
                "unknown severity '{}' (expected LOW, MEDIUM, HIGH or CRITICAL)",
                other
            ))),
        }
    }
}

/// How likely a vulnerability is to be reachable at runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[default]
    Theoretical,
    Possible,
    Likely,
    Active,
}

impl RiskLevel {
    /// Risk level from runtime evidence.
    ///
    /// | exposed | paths | severity       | level       |
    /// |---------|-------|----------------|-------------|
    /// | no      | no    | any            | THEORETICAL |
    /// | one of the two  || any            | POSSIBLE    |
    /// | yes     | yes   | CRITICAL/HIGH  | ACTIVE      |
    /// | yes     | yes   | MEDIUM/LOW     | LIKELY      |
    pub fn assess(exposed: bool, has_paths: bool, severity: Severity) -> Self {
        match (exposed, has_paths) {
            (false, false) => Self::Theoretical,
            (true, true) if severity >= Severity::High => Self::Active,
            (true, true) => Self::Likely,
            _ => Self::Possible,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Theoretical => "THEORETICAL",
            Self::Possible => "POSSIBLE",
            Self::Likely => "LIKELY",
            Self::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CVE matched against a dependency by an external matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityMatch {
    pub cve_id: String,
    pub package_name: String,
    #[serde(default)]
    pub severity: Severity,
    /// CVSS base score, 0-10. Missing scores count as 0.
    #[serde(default)]
    pub score: f64,
    /// Matcher confidence, 0-1.
    #[serde(default)]
    pub match_confidence: f64,
    /// Fixed versions in ascending order; the last one is the newest fix.
    #[serde(default)]
    pub fixed_versions: Vec<String>,
}

impl VulnerabilityMatch {
    pub fn new(
        cve_id: impl Into<String>,
        package_name: impl Into<String>,
        severity: Severity,
        score: f64,
    ) -> Self {
        Self {
            cve_id: cve_id.into(),
            package_name: package_name.into(),
            severity,
            score,
            match_confidence: 1.0,
            fixed_versions: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.match_confidence = confidence;
        self
    }

    pub fn with_fixed_version(mut self, version: impl Into<String>) -> Self {
        self.fixed_versions.push(version.into());
        self
    }

    pub fn latest_fix(&self) -> Option<&str> {
        self.fixed_versions.last().map(String::as_str)
    }
}

/// One observed execution from recent trace history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub trace_id: String,
    #[serde(default)]
    pub span_ids: Vec<String>,
    #[serde(default)]
    pub operation_names: Vec<String>,
    #[serde(default)]
    pub frequency: u64,
    pub last_seen: DateTime<Utc>,
}

/// Runtime-adjusted risk for one vulnerability match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRisk {
    pub cve_id: String,
    pub package_name: String,
    pub severity: Severity,
    pub runtime_exposure: bool,
    pub execution_paths: Vec<String>,
    /// 0-100.
    pub impact_score: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
}
