//! Latency recording for round-trip calls
//!
//! Recorders are injected into [`RoundTripClient`](crate::client::RoundTripClient)
//! as trait objects. The Prometheus implementation owns its registry; nothing
//! is registered process-wide.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Histogram name exposed for scraping.
pub const LATENCY_METRIC: &str = "roundtrip_latency_seconds";

/// Outcome counter name exposed for scraping.
pub const CALLS_METRIC: &str = "roundtrip_calls_total";

/// First bucket upper bound in seconds.
pub const BUCKET_START_SECS: f64 = 0.1;

/// Width of each linear bucket in seconds.
pub const BUCKET_WIDTH_SECS: f64 = 0.5;

/// Number of linear buckets.
pub const BUCKET_COUNT: usize = 20;

/// Sink for per-call latency.
///
/// Called on every unit's hot path; implementations must not block beyond
/// atomic updates.
pub trait LatencyRecorder: Send + Sync {
    /// Add one duration to the distribution.
    fn observe(&self, duration: Duration);

    /// Count a finished call by outcome.
    fn record_outcome(&self, _success: bool) {}
}

/// Recorder that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLatencyRecorder;

impl LatencyRecorder for NoopLatencyRecorder {
    fn observe(&self, _duration: Duration) {}
}

/// Prometheus-backed recorder with its own registry.
#[derive(Clone)]
pub struct PrometheusLatencyRecorder {
    registry: Registry,
    latency: Histogram,
    calls: IntCounterVec,
}

impl PrometheusLatencyRecorder {
    /// Create a recorder with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create a recorder registering into an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let buckets =
            prometheus::linear_buckets(BUCKET_START_SECS, BUCKET_WIDTH_SECS, BUCKET_COUNT)?;
        let latency = Histogram::with_opts(
            HistogramOpts::new(LATENCY_METRIC, "Round-trip latency to the generation service")
                .buckets(buckets),
        )?;
        let calls = IntCounterVec::new(
            Opts::new(CALLS_METRIC, "Round-trip calls by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(calls.clone()))?;

        Ok(Self {
            registry,
            latency,
            calls,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of durations observed so far.
    pub fn sample_count(&self) -> u64 {
        self.latency.get_sample_count()
    }

    /// Sum of observed durations, in seconds.
    pub fn sample_sum(&self) -> f64 {
        self.latency.get_sample_sum()
    }

    /// Calls counted with the given outcome.
    pub fn outcome_count(&self, success: bool) -> u64 {
        self.calls.with_label_values(&[outcome_label(success)]).get()
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn export_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Content type matching [`export_text`](Self::export_text).
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl LatencyRecorder for PrometheusLatencyRecorder {
    fn observe(&self, duration: Duration) {
        self.latency.observe(duration.as_secs_f64());
    }

    fn record_outcome(&self, success: bool) {
        self.calls.with_label_values(&[outcome_label(success)]).inc();
    }
}

fn outcome_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}
