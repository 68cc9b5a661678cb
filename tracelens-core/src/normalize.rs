//! Boundary normalization of loosely-typed span JSON.
//!
//! Accepts the native trace shape (`{traceId, spans: [...]}`) and OTLP/JSON
//! resource spans, and produces validated [`Trace`] values. Everything past
//! this module can assume required span fields are present.

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{TracelensError, TracelensResult};
use crate::trace::{Span, SpanLog, SpanStatus, TagValue, Tags, Trace};

/// Placeholder id for OTLP spans whose id bytes are missing.
const ZERO_TRACE_ID: &str = "00000000000000000000000000000000";

#[derive(Debug, Clone, Copy, Default)]
pub struct TraceNormalizer;

impl TraceNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Validate and normalize one native trace object.
    pub fn normalize_trace(&self, value: &Value) -> TracelensResult<Trace> {
        let Some(obj) = value.as_object() else {
            return Err(TracelensError::invalid_trace("", "Trace must be an object"));
        };

        let trace_id = match obj.get("traceId").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(TracelensError::invalid_trace("", "Trace must have a valid traceId")),
        };

        let spans = match obj.get("spans").and_then(Value::as_array) {
            Some(spans) if !spans.is_empty() => spans,
            _ => {
                return Err(TracelensError::invalid_trace(
                    trace_id,
                    "Trace must have at least one span",
                ))
            }
        };

        let spans = spans
            .iter()
            .enumerate()
            .map(|(index, span)| {
                span_from_value(span).map_err(|message| TracelensError::invalid_span(index, message))
            })
            .collect::<TracelensResult<Vec<Span>>>()?;

        Trace::from_spans(trace_id, spans)
    }

    /// Validate and normalize a single span record.
    pub fn normalize_span(&self, value: &Value) -> TracelensResult<Span> {
        span_from_value(value).map_err(|message| TracelensError::invalid_span(0, message))
    }

    /// Group the spans of one OTLP `resourceSpans` entry into traces.
    ///
    /// Spans that cannot be read are skipped with a warning. Times are
    /// converted from nanoseconds to microseconds.
    pub fn normalize_otlp_resource_span(&self, value: &Value) -> TracelensResult<Vec<Trace>> {
        let Some(obj) = value.as_object() else {
            return Err(TracelensError::invalid_argument("Resource span must be an object"));
        };
        let Some(scope_spans) = obj.get("scopeSpans").and_then(Value::as_array) else {
            return Err(TracelensError::invalid_argument(
                "Resource span must have scopeSpans array",
            ));
        };

        let mut by_trace: BTreeMap<String, Vec<Span>> = BTreeMap::new();
        for scope in scope_spans {
            let Some(spans) = scope.get("spans").and_then(Value::as_array) else {
                continue;
            };
            for raw in spans {
                match otlp_span(raw) {
                    Ok(span) => by_trace.entry(span.trace_id.clone()).or_default().push(span),
                    Err(message) => tracing::warn!(%message, "skipping OTLP span"),
                }
            }
        }

        by_trace
            .into_iter()
            .map(|(trace_id, spans)| Trace::from_spans(trace_id, spans))
            .collect()
    }

    /// Normalize any supported document: a trace object, an array of trace
    /// objects, or an OTLP export with `resourceSpans`.
    pub fn normalize_document(&self, value: &Value) -> TracelensResult<Vec<Trace>> {
        if let Some(resource_spans) = value.get("resourceSpans").and_then(Value::as_array) {
            let mut traces = Vec::new();
            for rs in resource_spans {
                traces.extend(self.normalize_otlp_resource_span(rs)?);
            }
            return Ok(traces);
        }
        match value {
            Value::Array(items) => items.iter().map(|t| self.normalize_trace(t)).collect(),
            other => Ok(vec![self.normalize_trace(other)?]),
        }
    }
}

fn span_from_value(value: &Value) -> Result<Span, String> {
    let obj = value.as_object().ok_or("Span must be an object")?;

    let required = |key: &str, message: &str| -> Result<String, String> {
        match obj.get(key).and_then(Value::as_str) {
            Some(s) if !s.is_empty() => Ok(s.to_string()),
            _ => Err(message.to_string()),
        }
    };
    let trace_id = required("traceId", "Span must have a valid traceId")?;
    let span_id = required("spanId", "Span must have a valid spanId")?;
    let operation_name = required("operationName", "Span must have an operationName")?;

    let start_time = obj
        .get("startTime")
        .and_then(Value::as_f64)
        .filter(|t| *t != 0.0 && t.is_finite())
        .ok_or("Span must have a valid startTime")?;

    let end_time = obj.get("endTime").and_then(Value::as_f64);
    let duration = obj
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|d| *d != 0.0)
        .or_else(|| end_time.map(|end| end - start_time));

    let parent_span_id = obj
        .get("parentSpanId")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    Ok(Span {
        trace_id,
        span_id,
        parent_span_id,
        operation_name,
        start_time,
        end_time,
        duration,
        tags: normalize_tags(obj.get("tags")),
        logs: normalize_logs(obj.get("logs")),
        status: normalize_status(obj.get("status")),
    })
}

fn tag_value(value: &Value) -> Option<TagValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(TagValue::Bool(*b)),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => TagValue::Int(i),
            None => TagValue::Float(n.as_f64().unwrap_or_default()),
        }),
        Value::String(s) => Some(TagValue::String(s.clone())),
        other => Some(TagValue::String(other.to_string())),
    }
}

fn normalize_tags(tags: Option<&Value>) -> Tags {
    tags.and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| tag_value(v).map(|tv| (k.clone(), tv)))
                .collect()
        })
        .unwrap_or_default()
}

fn normalize_logs(logs: Option<&Value>) -> Vec<SpanLog> {
    let Some(entries) = logs.and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .map(|entry| SpanLog {
            timestamp: entry
                .get("timestamp")
                .and_then(Value::as_f64)
                .unwrap_or_else(|| Utc::now().timestamp_micros() as f64),
            fields: normalize_tags(entry.get("fields")),
        })
        .collect()
}

fn status_from_name(name: &str) -> SpanStatus {
    SpanStatus::from_name(name).unwrap_or_default()
}

fn normalize_status(status: Option<&Value>) -> SpanStatus {
    match status {
        Some(Value::String(name)) => status_from_name(name),
        Some(Value::Object(obj)) => match obj.get("code") {
            Some(Value::String(name)) => status_from_name(name),
            Some(code) => code.as_i64().map_or(SpanStatus::Ok, SpanStatus::from_otlp_code),
            None => SpanStatus::Ok,
        },
        _ => SpanStatus::Ok,
    }
}

/// OTLP ids arrive as hex strings in OTLP/JSON or as raw byte arrays.
fn otlp_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.to_lowercase()),
        Value::Array(bytes) if !bytes.is_empty() => bytes
            .iter()
            .map(|b| b.as_u64().filter(|b| *b <= 0xff).map(|b| format!("{:02x}", b)))
            .collect(),
        _ => None,
    }
}

/// Nanosecond timestamps may be encoded as strings to survive JSON.
fn otlp_nanos(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::String(s)) => s.parse::<f64>().unwrap_or(0.0),
        Some(v) => v.as_f64().unwrap_or(0.0),
        None => 0.0,
    }
}

fn otlp_attributes(attributes: Option<&Value>) -> Tags {
    let mut tags = Tags::new();
    let Some(items) = attributes.and_then(Value::as_array) else {
        return tags;
    };
    for attr in items {
        let (Some(key), Some(value)) = (attr.get("key").and_then(Value::as_str), attr.get("value"))
        else {
            continue;
        };
        let tag = if let Some(s) = value.get("stringValue").and_then(Value::as_str) {
            TagValue::from(s)
        } else if let Some(i) = value.get("intValue") {
            // int64 values are strings in OTLP/JSON.
            match i {
                Value::String(s) => match s.parse::<i64>() {
                    Ok(n) => TagValue::Int(n),
                    Err(_) => continue,
                },
                other => match other.as_i64() {
                    Some(n) => TagValue::Int(n),
                    None => continue,
                },
            }
        } else if let Some(d) = value.get("doubleValue").and_then(Value::as_f64) {
            TagValue::Float(d)
        } else if let Some(b) = value.get("boolValue").and_then(Value::as_bool) {
            TagValue::Bool(b)
        } else {
            continue;
        };
        tags.insert(key.to_string(), tag);
    }
    tags
}

fn otlp_span(value: &Value) -> Result<Span, String> {
    if !value.is_object() {
        return Err("OTLP span must be an object".to_string());
    }

    let trace_id = otlp_id(value.get("traceId")).unwrap_or_else(|| ZERO_TRACE_ID.to_string());
    let span_id = otlp_id(value.get("spanId")).ok_or("OTLP span must have a spanId")?;
    let parent_span_id = otlp_id(value.get("parentSpanId"));

    let start_time = otlp_nanos(value.get("startTimeUnixNano")) / 1000.0;
    let end = otlp_nanos(value.get("endTimeUnixNano")) / 1000.0;
    let end_time = (end > 0.0).then_some(end);
    let duration = (end > start_time).then(|| end - start_time);

    let status = value
        .get("status")
        .and_then(|s| s.get("code"))
        .and_then(Value::as_i64)
        .map_or(SpanStatus::Ok, SpanStatus::from_otlp_code);

    Ok(Span {
        trace_id,
        span_id,
        parent_span_id,
        operation_name: value
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or("unknown")
            .to_string(),
        start_time,
        end_time,
        duration,
        tags: otlp_attributes(value.get("attributes")),
        logs: Vec::new(),
        status,
    })
}
