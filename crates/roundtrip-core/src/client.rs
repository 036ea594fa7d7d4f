//! Round-trip client: one timed call to the target service
//!
//! Transport sits behind [`GenerationBackend`]; [`HttpGenerationBackend`] is
//! the reqwest implementation used in production. [`RoundTripClient`] wraps a
//! backend with timing, latency recording and a trace span.

use crate::error::{CallError, HarnessError, HarnessResult};
use crate::observation::{Observation, Outcome};
use crate::recorder::{LatencyRecorder, NoopLatencyRecorder};
use crate::span::{NoopSpanRecorder, SpanRecorder};
use crate::target::{Target, TargetKind};
use async_trait::async_trait;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs the raw request/response exchange for one call.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Send `prompt` to `target` and return the decoded payload.
    ///
    /// # Errors
    ///
    /// Returns a [`CallError`] for transport failures, timeouts, non-success
    /// statuses, undecodable bodies and empty output.
    async fn generate(&self, target: &Target, prompt: &str) -> Result<String, CallError>;
}

/// Generation request body.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Generation response body.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Agent send request body.
#[derive(Debug, Serialize)]
struct AgentSendRequest<'a> {
    prompt: &'a str,
}

/// reqwest-backed transport with a fixed per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpGenerationBackend {
    client: Client,
    timeout: Duration,
}

impl HttpGenerationBackend {
    /// Create a backend whose calls time out after `timeout`.
    pub fn new(timeout: Duration) -> HarnessResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarnessError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_transport(&self, err: reqwest::Error) -> CallError {
        if err.is_timeout() {
            CallError::Timeout {
                after: self.timeout,
            }
        } else {
            CallError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn generate(&self, target: &Target, prompt: &str) -> Result<String, CallError> {
        let request = match &target.kind {
            TargetKind::Generate { model } => self
                .client
                .post(&target.endpoint)
                .json(&GenerateRequest {
                    model,
                    prompt,
                    stream: false,
                }),
            TargetKind::AgentSend => self
                .client
                .post(&target.endpoint)
                .json(&AgentSendRequest { prompt }),
        };

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();

        // Read the whole body before judging the call, so timing always covers it
        let body = response.bytes().await.map_err(|e| self.map_transport(e))?;

        if !status.is_success() {
            return Err(CallError::status(
                status.as_u16(),
                String::from_utf8_lossy(&body),
            ));
        }

        match &target.kind {
            TargetKind::Generate { .. } => {
                let decoded: GenerateResponse = serde_json::from_slice(&body)
                    .map_err(|e| CallError::Decode(e.to_string()))?;
                if decoded.response.is_empty() {
                    return Err(CallError::EmptyResponse);
                }
                Ok(decoded.response)
            }
            TargetKind::AgentSend => String::from_utf8(body.to_vec())
                .map_err(|e| CallError::Decode(e.to_string())),
        }
    }
}

/// Times one call, records its latency and wraps it in a span.
pub struct RoundTripClient {
    backend: Arc<dyn GenerationBackend>,
    latency: Arc<dyn LatencyRecorder>,
    spans: Arc<dyn SpanRecorder>,
}

impl RoundTripClient {
    /// Create a client with no-op latency and span recorders.
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            latency: Arc::new(NoopLatencyRecorder),
            spans: Arc::new(NoopSpanRecorder),
        }
    }

    #[must_use]
    pub fn with_latency_recorder(mut self, recorder: Arc<dyn LatencyRecorder>) -> Self {
        self.latency = recorder;
        self
    }

    #[must_use]
    pub fn with_span_recorder(mut self, recorder: Arc<dyn SpanRecorder>) -> Self {
        self.spans = recorder;
        self
    }

    /// Perform one round trip on behalf of `unit`.
    ///
    /// Never fails: errors, including a panicking backend, are captured in the
    /// returned observation. Latency is recorded for every outcome.
    pub async fn call(&self, target: &Target, prompt: &str, unit: usize) -> Observation {
        let span = self.spans.call_span(target, unit);

        let start = Instant::now();
        let result = match AssertUnwindSafe(self.backend.generate(target, prompt))
            .catch_unwind()
            .instrument(span.clone())
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(CallError::Panicked(panic_message(payload.as_ref()))),
        };
        let duration = start.elapsed();

        self.latency.observe(duration);
        self.latency.record_outcome(result.is_ok());

        let outcome = match result {
            Ok(payload) => {
                debug!(unit, ?duration, bytes = payload.len(), "Round trip succeeded");
                Outcome::Success(payload)
            }
            Err(error) => {
                self.spans.record_failure(&span, &error);
                warn!(unit, ?duration, error = %error, "Round trip failed");
                Outcome::Failure(error)
            }
        };

        Observation {
            unit,
            duration,
            outcome,
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
