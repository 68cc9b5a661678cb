//! Typed error handling for tracelens.
//!
//! Structural input problems (malformed traces and spans) are the only
//! fatal conditions inside the engine. Degenerate graphs never produce an
//! error; they yield empty or zeroed results instead.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tracelens operations.
#[derive(Error, Debug)]
pub enum TracelensError {
    /// A trace failed validation (empty span list, mismatched trace ids)
    #[error("Invalid trace {trace_id}: {message}")]
    InvalidTrace { trace_id: String, message: String },

    /// A span record is missing a required field or has the wrong type
    #[error("Invalid span at index {index}: {message}")]
    InvalidSpan { index: usize, message: String },

    /// I/O error when reading trace, vulnerability or history files
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file errors
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// JSON input could not be decoded
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Invalid argument provided
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl TracelensError {
    /// Create a trace validation error.
    pub fn invalid_trace(trace_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTrace {
            trace_id: trace_id.into(),
            message: message.into(),
        }
    }

    /// Create a span validation error for the span at `index`.
    pub fn invalid_span(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidSpan {
            index,
            message: message.into(),
        }
    }

    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error.
    ///
    /// A batch run can skip the offending input and continue with the rest.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidTrace { .. } | Self::InvalidSpan { .. } | Self::Serialization { .. }
        )
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Config { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TracelensError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Convenience type alias for tracelens results.
pub type TracelensResult<T> = Result<T, TracelensError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> TracelensResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> TracelensResult<T> {
        self.map_err(|e| TracelensError::io(path, e))
    }
}
