//! Concurrent round-trip load harness for text-generation services.
//!
//! A run fires N identical calls at a [`Target`], joins all of them, and
//! judges every [`Observation`] against an SLA latency bound. Latency goes to
//! a pluggable [`LatencyRecorder`] and each call is wrapped in a span from a
//! pluggable [`SpanRecorder`].

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod harness;
pub mod observation;
pub mod recorder;
pub mod report;
pub mod span;
pub mod target;

pub use client::{GenerationBackend, HttpGenerationBackend, RoundTripClient, DEFAULT_CALL_TIMEOUT};
pub use config::HarnessConfig;
pub use discovery::discover_agent;
pub use error::{CallError, DiscoveryError, HarnessError, HarnessResult};
pub use harness::{CancelHandle, CancelSignal, LoadHarness, DEFAULT_PROMPT};
pub use observation::{
    evaluate, Completion, LoadRun, Observation, Outcome, RunResult, SlaViolation, Verdict,
};
pub use recorder::{LatencyRecorder, NoopLatencyRecorder, PrometheusLatencyRecorder};
pub use report::{ReportFormat, RunReport};
pub use span::{NoopSpanRecorder, SpanRecorder, TracingSpanRecorder};
pub use target::{Target, TargetKind};
