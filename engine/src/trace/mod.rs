//! Workflow Tracing
//!
//! Records one span per pipeline stage and ships completed traces to an
//! optional external sink. Tracing is strictly best-effort: every sink error
//! is logged and swallowed, and a request never fails because of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Mutex;
use uuid::Uuid;

/// Degradation kind attached to a span when its stage did not complete
/// cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanErrorKind {
    /// Retrieval collaborator failed; pipeline continued without snippets
    RetrievalError,
    /// Retrieval succeeded but matched nothing above the score floor
    RetrievalEmpty,
    /// Reasoning collaborator failed; request aborted
    AnalysisError,
    /// A course fetch failed; that skill got an empty course list
    ToolError,
    /// Snippet generation failed; fallback snippet substituted
    GenerationError,
    /// Generated code tripped the safety filter twice
    SafetyRejection,
    /// Sandbox was unusable; validation reported as unavailable
    SandboxError,
}

/// One recorded pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSpan {
    pub stage_name: String,
    pub start_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub input_summary: String,
    pub output_summary: String,
    pub error_kind: Option<SpanErrorKind>,
}

impl TraceSpan {
    pub fn new(
        stage_name: impl Into<String>,
        start_time: DateTime<Utc>,
        input_summary: impl Into<String>,
        output_summary: impl Into<String>,
        error_kind: Option<SpanErrorKind>,
    ) -> Self {
        let duration = Utc::now().signed_duration_since(start_time);
        Self {
            stage_name: stage_name.into(),
            start_time,
            duration_ms: duration.num_milliseconds().max(0) as u64,
            input_summary: input_summary.into(),
            output_summary: output_summary.into(),
            error_kind,
        }
    }
}

/// Span sink for workflow traces.
///
/// Implementations must never propagate errors to the caller; the methods
/// are infallible by contract and failures stay inside the recorder.
pub trait TraceRecorder: Send + Sync {
    /// Open a trace for one request and return its id.
    fn start_trace(&self, name: &str) -> Uuid;

    /// Attach a completed span to an open trace.
    fn record_span(&self, trace_id: Uuid, span: TraceSpan);

    /// Close a trace, flushing it to the sink if one is configured.
    fn end_trace(&self, trace_id: Uuid, outcome: &str);
}

/// In-process recorder. The default when no external sink is configured,
/// and the one the tests inspect.
#[derive(Default)]
pub struct MemoryTraceRecorder {
    traces: Mutex<Vec<(Uuid, String, Vec<TraceSpan>, Option<String>)>>,
}

impl MemoryTraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans recorded for a trace, in recording order.
    pub fn spans(&self, trace_id: Uuid) -> Vec<TraceSpan> {
        let traces = self.traces.lock().unwrap_or_else(|e| e.into_inner());
        traces
            .iter()
            .find(|(id, ..)| *id == trace_id)
            .map(|(_, _, spans, _)| spans.clone())
            .unwrap_or_default()
    }

    /// Ids of all traces started so far, in order.
    pub fn trace_ids(&self) -> Vec<Uuid> {
        let traces = self.traces.lock().unwrap_or_else(|e| e.into_inner());
        traces.iter().map(|(id, ..)| *id).collect()
    }

    /// Recorded outcome for a trace, if it has been ended.
    pub fn outcome(&self, trace_id: Uuid) -> Option<String> {
        let traces = self.traces.lock().unwrap_or_else(|e| e.into_inner());
        traces
            .iter()
            .find(|(id, ..)| *id == trace_id)
            .and_then(|(_, _, _, outcome)| outcome.clone())
    }
}

impl TraceRecorder for MemoryTraceRecorder {
    fn start_trace(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut traces = self.traces.lock().unwrap_or_else(|e| e.into_inner());
        traces.push((id, name.to_string(), Vec::new(), None));
        id
    }

    fn record_span(&self, trace_id: Uuid, span: TraceSpan) {
        let mut traces = self.traces.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, _, spans, _)) = traces.iter_mut().find(|(id, ..)| *id == trace_id) {
            spans.push(span);
        }
    }

    fn end_trace(&self, trace_id: Uuid, outcome: &str) {
        let mut traces = self.traces.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, _, _, slot)) = traces.iter_mut().find(|(id, ..)| *id == trace_id) {
            *slot = Some(outcome.to_string());
        }
    }
}

/// Recorder that posts completed traces to an external HTTP sink.
///
/// Spans are buffered in memory until `end_trace`, then the whole trace is
/// shipped from a detached task so the request path never waits on the sink.
pub struct HttpTraceRecorder {
    endpoint: String,
    project: String,
    api_key: Option<String>,
    client: reqwest::Client,
    buffer: MemoryTraceRecorder,
}

impl HttpTraceRecorder {
    pub fn new(endpoint: String, project: String, api_key: Option<String>) -> Self {
        Self {
            endpoint,
            project,
            api_key,
            client: reqwest::Client::new(),
            buffer: MemoryTraceRecorder::new(),
        }
    }
}

impl TraceRecorder for HttpTraceRecorder {
    fn start_trace(&self, name: &str) -> Uuid {
        self.buffer.start_trace(name)
    }

    fn record_span(&self, trace_id: Uuid, span: TraceSpan) {
        self.buffer.record_span(trace_id, span);
    }

    fn end_trace(&self, trace_id: Uuid, outcome: &str) {
        self.buffer.end_trace(trace_id, outcome);
        let spans = self.buffer.spans(trace_id);

        let payload = json!({
            "project": self.project,
            "trace_id": trace_id,
            "outcome": outcome,
            "spans": spans,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(status = %response.status(), "Trace sink rejected trace");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to ship trace");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_recorder_keeps_spans_in_order() {
        let recorder = MemoryTraceRecorder::new();
        let id = recorder.start_trace("career_path");
        recorder.record_span(
            id,
            TraceSpan::new("retrieve", Utc::now(), "query", "3 snippets", None),
        );
        recorder.record_span(
            id,
            TraceSpan::new(
                "analyze",
                Utc::now(),
                "3 snippets",
                "3 skills",
                Some(SpanErrorKind::ToolError),
            ),
        );
        recorder.end_trace(id, "success");

        let spans = recorder.spans(id);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].stage_name, "retrieve");
        assert_eq!(spans[1].error_kind, Some(SpanErrorKind::ToolError));
        assert_eq!(recorder.outcome(id), Some("success".to_string()));
    }

    #[test]
    fn test_traces_are_isolated_by_id() {
        let recorder = MemoryTraceRecorder::new();
        let a = recorder.start_trace("first");
        let b = recorder.start_trace("second");
        recorder.record_span(a, TraceSpan::new("retrieve", Utc::now(), "q", "out", None));

        assert_eq!(recorder.spans(a).len(), 1);
        assert!(recorder.spans(b).is_empty());
        assert_eq!(recorder.trace_ids(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_unreachable_sink_never_fails_the_caller() {
        // Port 9 (discard) refuses connections; the shipping task swallows it.
        let recorder = HttpTraceRecorder::new(
            "http://127.0.0.1:9/traces".to_string(),
            "skillpath".to_string(),
            None,
        );
        let id = recorder.start_trace("career_path");
        recorder.record_span(id, TraceSpan::new("retrieve", Utc::now(), "q", "out", None));
        recorder.end_trace(id, "success");

        // Give the detached task a moment to hit the connection error
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(recorder.buffer.spans(id).len(), 1);
    }

    #[test]
    fn test_span_duration_is_non_negative() {
        // A start time in the future must not underflow the duration.
        let future = Utc::now() + chrono::Duration::seconds(5);
        let span = TraceSpan::new("retrieve", future, "q", "out", None);
        assert_eq!(span.duration_ms, 0);
    }
}
