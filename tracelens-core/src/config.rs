//! Configuration loading from tracelens.toml.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::engine::AnalysisOptions;
use crate::error::TracelensError;
use crate::optimizer::OptimizeOptions;

pub const CONFIG_FILE: &str = "tracelens.toml";

/// Main configuration structure for tracelens.toml.
#[derive(Debug, Deserialize, Default)]
pub struct TracelensConfig {
    pub analysis: Option<AnalysisConfig>,
    pub optimizer: Option<OptimizerConfig>,
    pub security: Option<SecurityConfig>,
    pub output: Option<OutputConfig>,
}

/// `[analysis]` table.
#[derive(Debug, Deserialize, Default)]
pub struct AnalysisConfig {
    pub optimize_graph: Option<bool>,
    pub max_nodes: Option<usize>,
    pub blocking_threshold: Option<f64>,
    pub include_recommendations: Option<bool>,
    pub max_paths: Option<usize>,
}

/// `[optimizer]` table.
#[derive(Debug, Deserialize, Default)]
pub struct OptimizerConfig {
    pub remove_noise: Option<bool>,
    pub merge_short_spans: Option<bool>,
    pub simplify_paths: Option<bool>,
}

/// `[security]` table.
#[derive(Debug, Deserialize, Default)]
pub struct SecurityConfig {
    pub exposure_window_days: Option<i64>,
    pub include_theoretical: Option<bool>,
    /// "LOW", "MEDIUM", "HIGH" or "CRITICAL".
    pub min_severity: Option<String>,
    pub max_results: Option<usize>,
}

/// Output format configuration.
#[derive(Debug, Deserialize, Default)]
pub struct OutputConfig {
    /// Output format: "plain" or "json".
    pub format: Option<String>,
}

impl TracelensConfig {
    /// Analysis options with every configured value applied over the
    /// defaults.
    pub fn analysis_options(&self) -> AnalysisOptions {
        let mut options = AnalysisOptions::default();
        if let Some(a) = &self.analysis {
            if let Some(v) = a.optimize_graph {
                options.optimize_graph = v;
            }
            if a.max_nodes.is_some() {
                options.max_nodes = a.max_nodes;
            }
            if a.blocking_threshold.is_some() {
                options.blocking_threshold = a.blocking_threshold;
            }
            if let Some(v) = a.include_recommendations {
                options.include_recommendations = v;
            }
            if let Some(v) = a.max_paths {
                options.max_paths = v;
            }
        }
        if let Some(o) = &self.optimizer {
            let mut opt = OptimizeOptions::default();
            if let Some(v) = o.remove_noise {
                opt = opt.remove_noise(v);
            }
            if let Some(v) = o.merge_short_spans {
                opt = opt.merge_short_spans(v);
            }
            if let Some(v) = o.simplify_paths {
                opt = opt.simplify_paths(v);
            }
            options.optimizer = opt;
        }
        options
    }

    /// Report filters from `[security]`. An unparsable `min_severity` is an
    /// error rather than silently ignored.
    #[cfg(feature = "security")]
    pub fn scan_options(&self) -> Result<crate::security::ScanOptions> {
        let mut options = crate::security::ScanOptions::default();
        if let Some(s) = &self.security {
            options.include_theoretical = s.include_theoretical.unwrap_or(false);
            options.max_results = s.max_results;
            options.min_severity = s
                .min_severity
                .as_deref()
                .map(str::parse::<crate::security::Severity>)
                .transpose()
                .context("Invalid [security].min_severity")?;
        }
        Ok(options)
    }

    pub fn exposure_window_days(&self) -> Option<i64> {
        self.security.as_ref().and_then(|s| s.exposure_window_days)
    }

    pub fn wants_json(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|o| o.format.as_deref())
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}

/// Loads configuration from tracelens.toml if it exists.
pub fn load_config(root: &Path) -> Result<Option<TracelensConfig>> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg = toml::from_str(&content)
        .map_err(|e| TracelensError::config(&path, e.to_string()))
        .context("Invalid tracelens.toml")?;
    Ok(Some(cfg))
}
