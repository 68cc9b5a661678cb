//! Span and trace records consumed by the engine.
//!
//! Times are microseconds since the epoch. A span without a parent is a
//! root; every span in a [`Trace`] carries that trace's id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{TracelensError, TracelensResult};

/// A single tag value attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl TagValue {
    /// Convert to a JSON value for graph metadata.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for TagValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for TagValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Span tag map. Ordered so serialized metadata is stable.
pub type Tags = BTreeMap<String, TagValue>;

/// Completion status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    #[default]
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl SpanStatus {
    /// All statuses in OTLP code order (index == code).
    pub const ALL: [SpanStatus; 17] = [
        Self::Ok,
        Self::Cancelled,
        Self::Unknown,
        Self::InvalidArgument,
        Self::DeadlineExceeded,
        Self::NotFound,
        Self::AlreadyExists,
        Self::PermissionDenied,
        Self::ResourceExhausted,
        Self::FailedPrecondition,
        Self::Aborted,
        Self::OutOfRange,
        Self::Unimplemented,
        Self::Internal,
        Self::Unavailable,
        Self::DataLoss,
        Self::Unauthenticated,
    ];

    /// Map an OTLP numeric status code. Unknown codes become `Unknown`.
    pub fn from_otlp_code(code: i64) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or(Self::Unknown)
    }

    /// Parse the wire name (`"DEADLINE_EXCEEDED"`), case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        Self::ALL.iter().copied().find(|s| s.as_str() == upper)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured log entry recorded inside a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLog {
    pub timestamp: f64,
    #[serde(default)]
    pub fields: Tags,
}

/// One unit of work inside a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<SpanLog>,
    #[serde(default)]
    pub status: SpanStatus,
}

impl Span {
    /// Create a span with no timing end, tags or parent.
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        operation_name: impl Into<String>,
        start_time: f64,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
            operation_name: operation_name.into(),
            start_time,
            end_time: None,
            duration: None,
            tags: Tags::new(),
            logs: Vec::new(),
            status: SpanStatus::Ok,
        }
    }

    /// Set the parent span id.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent.into());
        self
    }

    /// Set the end time and derive the duration.
    pub fn with_end(mut self, end_time: f64) -> Self {
        self.end_time = Some(end_time);
        self.duration = Some(end_time - self.start_time);
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Explicit duration, else `end - start` when the end is known.
    pub fn effective_duration(&self) -> Option<f64> {
        self.duration
            .or_else(|| self.end_time.map(|end| end - self.start_time))
    }

    /// End of the span's time window, if it can be determined.
    pub fn effective_end(&self) -> Option<f64> {
        self.end_time
            .or_else(|| self.duration.map(|d| self.start_time + d))
    }
}

/// A set of spans sharing one trace id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<Span>,
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Id of the span without a parent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_span_id: Option<String>,
}

impl Trace {
    /// Assemble a trace from spans, deriving its time window and root.
    ///
    /// start = min span start, end = max known span end, duration = end - start.
    pub fn from_spans(trace_id: impl Into<String>, spans: Vec<Span>) -> TracelensResult<Self> {
        let trace_id = trace_id.into();
        if spans.is_empty() {
            return Err(TracelensError::invalid_trace(
                trace_id,
                "Trace must have at least one span",
            ));
        }

        let start_time = spans
            .iter()
            .map(|s| s.start_time)
            .fold(f64::INFINITY, f64::min);
        let end_time = spans
            .iter()
            .filter_map(|s| s.end_time)
            .fold(None, |acc: Option<f64>, end| Some(acc.map_or(end, |a| a.max(end))));
        let duration = end_time.map(|end| end - start_time);
        let root_span_id = spans.iter().find(|s| s.is_root()).map(|s| s.span_id.clone());

        Ok(Self {
            trace_id,
            spans,
            start_time,
            end_time,
            duration,
            root_span_id,
        })
    }

    /// Check the structural invariants the engine relies on.
    pub fn validate(&self) -> TracelensResult<()> {
        if self.spans.is_empty() {
            return Err(TracelensError::invalid_trace(
                &self.trace_id,
                "Trace must have at least one span",
            ));
        }
        for (index, span) in self.spans.iter().enumerate() {
            if span.span_id.is_empty() {
                return Err(TracelensError::invalid_span(index, "Span must have a valid spanId"));
            }
            if span.operation_name.is_empty() {
                return Err(TracelensError::invalid_span(index, "Span must have an operationName"));
            }
            if span.trace_id != self.trace_id {
                return Err(TracelensError::invalid_trace(
                    &self.trace_id,
                    format!(
                        "span {} belongs to trace {}",
                        span.span_id, span.trace_id
                    ),
                ));
            }
        }
        Ok(())
    }

    /// The root span record, if present.
    pub fn root_span(&self) -> Option<&Span> {
        match &self.root_span_id {
            Some(id) => self.spans.iter().find(|s| &s.span_id == id),
            None => self.spans.iter().find(|s| s.is_root()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_spans_derives_window() {
        let spans = vec![
            Span::new("t", "a", "root", 100.0).with_end(500.0),
            Span::new("t", "b", "child", 150.0).with_parent("a").with_end(650.0),
        ];
        let trace = Trace::from_spans("t", spans).unwrap();
        assert_eq!(trace.start_time, 100.0);
        assert_eq!(trace.end_time, Some(650.0));
        assert_eq!(trace.duration, Some(550.0));
        assert_eq!(trace.root_span_id.as_deref(), Some("a"));
        assert_eq!(trace.root_span().map(|s| s.operation_name.as_str()), Some("root"));
    }

    #[test]
    fn test_from_spans_without_ends() {
        let spans = vec![Span::new("t", "a", "root", 10.0)];
        let trace = Trace::from_spans("t", spans).unwrap();
        assert_eq!(trace.end_time, None);
        assert_eq!(trace.duration, None);
    }

    #[test]
    fn test_from_spans_rejects_empty() {
        let err = Trace::from_spans("empty", Vec::new()).unwrap_err();
        assert!(matches!(err, TracelensError::InvalidTrace { .. }));
    }

    #[test]
    fn test_validate_rejects_foreign_span() {
        let mut trace =
            Trace::from_spans("t", vec![Span::new("t", "a", "root", 0.0).with_end(1.0)]).unwrap();
        trace.spans.push(Span::new("other", "b", "x", 0.0));
        assert!(trace.validate().is_err());
    }

    #[test]
    fn test_status_otlp_codes() {
        assert_eq!(SpanStatus::from_otlp_code(0), SpanStatus::Ok);
        assert_eq!(SpanStatus::from_otlp_code(4), SpanStatus::DeadlineExceeded);
        assert_eq!(SpanStatus::from_otlp_code(16), SpanStatus::Unauthenticated);
        assert_eq!(SpanStatus::from_otlp_code(17), SpanStatus::Unknown);
        assert_eq!(SpanStatus::from_otlp_code(-1), SpanStatus::Unknown);
    }

    #[test]
    fn test_status_names_round_trip_through_serde() {
        let json = serde_json::to_string(&SpanStatus::ResourceExhausted).unwrap();
        assert_eq!(json, "\"RESOURCE_EXHAUSTED\"");
        assert_eq!(SpanStatus::from_name("permission_denied"), Some(SpanStatus::PermissionDenied));
        assert_eq!(SpanStatus::from_name("bogus"), None);
    }

    #[test]
    fn test_span_deserializes_camel_case() {
        let span: Span = serde_json::from_str(
            r#"{"traceId":"t","spanId":"s","parentSpanId":"p","operationName":"GET /",
                "startTime":5,"endTime":9,"tags":{"http.status":200,"cached":false}}"#,
        )
        .unwrap();
        assert_eq!(span.parent_span_id.as_deref(), Some("p"));
        assert_eq!(span.effective_duration(), Some(4.0));
        assert_eq!(span.tags.get("http.status"), Some(&TagValue::Int(200)));
        assert_eq!(span.tags.get("cached"), Some(&TagValue::Bool(false)));
        assert_eq!(span.status, SpanStatus::Ok);
    }
}
