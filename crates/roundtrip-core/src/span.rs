//! Trace spans around round-trip calls
//!
//! A span is handed to the client, which instruments the call future with it.
//! The span closes when the last handle drops, so it ends on success, error,
//! panic and cancellation alike.

use crate::error::CallError;
use crate::target::Target;
use tracing::Span;

/// Produces and annotates one span per call.
pub trait SpanRecorder: Send + Sync {
    /// Open a span for the call made by `unit` against `target`.
    fn call_span(&self, target: &Target, unit: usize) -> Span;

    /// Attach failure details to a span before it closes.
    fn record_failure(&self, span: &Span, error: &CallError);
}

/// Recorder producing disabled spans.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSpanRecorder;

impl SpanRecorder for NoopSpanRecorder {
    fn call_span(&self, _target: &Target, _unit: usize) -> Span {
        Span::none()
    }

    fn record_failure(&self, _span: &Span, _error: &CallError) {}
}

/// Recorder emitting `tracing` spans, exported by whatever layer is installed
/// (the worker bridges them to OpenTelemetry).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSpanRecorder;

impl SpanRecorder for TracingSpanRecorder {
    fn call_span(&self, target: &Target, unit: usize) -> Span {
        tracing::info_span!(
            "roundtrip.call",
            unit = unit,
            endpoint = %target.endpoint,
            otel.kind = "client",
            error = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
        )
    }

    fn record_failure(&self, span: &Span, error: &CallError) {
        span.record("error", tracing::field::display(error));
        span.record("otel.status_code", "ERROR");
    }
}
