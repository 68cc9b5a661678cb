//! Parallel, deterministic discovery and loading of trace files.
//!
//! Performance characteristics:
//! - Early directory pruning via `WalkDir::filter_entry` (O(1) subtree skip)
//! - Parallel file filtering via Rayon's `par_bridge`
//! - Parallel parse and normalization, one file per worker

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{IoResultExt, TracelensError, TracelensResult};
use crate::normalize::TraceNormalizer;
use crate::trace::Trace;

/// Directories never searched for traces.
const EXCLUDED_DIRS: &[&str] = &["target", ".git", "node_modules"];

#[inline]
fn is_excluded_dir(entry: &walkdir::DirEntry, excludes: &HashSet<&str>) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excludes.contains(name))
}

/// All `*.json` files under `root`, sorted. A file path is returned as is.
pub fn gather_trace_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let excludes: HashSet<&str> = EXCLUDED_DIRS.iter().copied().collect();
    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e, &excludes))
        .par_bridge()
        .filter_map(|entry| match entry {
            Ok(e) => {
                let path = e.path();
                if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                    Some(Ok(path.to_path_buf()))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(e.into())),
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to gather trace files from {}", root.display()))?;

    // par_bridge yields in arbitrary order.
    files.sort();
    Ok(files)
}

/// Read and decode one JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> TracelensResult<T> {
    let content = fs::read_to_string(path).with_path(path)?;
    serde_json::from_str(&content)
        .map_err(|e| TracelensError::serialization(format!("{}: {}", path.display(), e)))
}

/// Normalize every trace in one file (object, array, or OTLP export).
pub fn load_trace_file(path: &Path) -> TracelensResult<Vec<Trace>> {
    let value: serde_json::Value = read_json(path)?;
    TraceNormalizer::new().normalize_document(&value)
}

/// Load traces from all `files` in parallel, keeping file order.
///
/// Files with malformed JSON or invalid traces are skipped with a warning;
/// I/O failures abort the load.
pub fn load_traces(files: &[PathBuf]) -> TracelensResult<Vec<Trace>> {
    let per_file: Vec<TracelensResult<Vec<Trace>>> =
        files.par_iter().map(|f| load_trace_file(f)).collect();

    let mut traces = Vec::new();
    for (file, result) in files.iter().zip(per_file) {
        match result {
            Ok(loaded) => traces.extend(loaded),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(file = %file.display(), error = %e, "skipping trace file");
            }
            Err(e) => return Err(e),
        }
    }
    tracing::debug!(files = files.len(), traces = traces.len(), "loaded traces");
    Ok(traces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TRACE: &str = r#"{
        "traceId": "t1",
        "spans": [
            {"traceId": "t1", "spanId": "a", "operationName": "root", "startTime": 1, "endTime": 100}
        ]
    }"#;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("one.json"), TRACE).unwrap();
        fs::write(dir.path().join("nested/two.json"), format!("[{}, {}]", TRACE, TRACE)).unwrap();
        fs::write(dir.path().join("node_modules/skip.json"), TRACE).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a trace").unwrap();
        dir
    }

    #[test]
    fn test_gather_trace_files() {
        let dir = project();
        let files = gather_trace_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["nested/two.json", "one.json"]);
    }

    #[test]
    fn test_single_file_root() {
        let dir = project();
        let file = dir.path().join("one.json");
        assert_eq!(gather_trace_files(&file).unwrap(), vec![file]);
    }

    #[test]
    fn test_load_traces_skips_bad_files() {
        let dir = project();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("empty.json"), r#"{"traceId": "x", "spans": []}"#).unwrap();

        let files = gather_trace_files(dir.path()).unwrap();
        assert_eq!(files.len(), 4);
        let traces = load_traces(&files).unwrap();
        assert_eq!(traces.len(), 3);
        assert!(traces.iter().all(|t| t.trace_id == "t1"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_traces(&[dir.path().join("gone.json")]).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.path().is_some());
    }
}
