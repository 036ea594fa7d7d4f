//! Concurrent load harness
//!
//! Fires N units at a target, joins every one of them and evaluates the
//! collected observations against an SLA bound. Units run as tasks in a
//! [`JoinSet`]; dropping the harness future aborts whatever is still running.

use crate::client::{panic_message, RoundTripClient};
use crate::error::{CallError, HarnessError, HarnessResult};
use crate::observation::{Completion, LoadRun, Observation, Outcome, RunResult};
use crate::target::Target;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Prompt used when the caller supplies an empty one.
pub const DEFAULT_PROMPT: &str = "Write hello world in Python";

/// Triggers cancellation of a running load.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by units to stop early.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a linked handle/signal pair.
    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
    }

    /// Signal that never fires.
    pub fn never() -> CancelSignal {
        let (_tx, rx) = watch::channel(false);
        CancelSignal { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested; pend forever if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            let fired = *self.rx.borrow_and_update();
            if fired {
                return;
            }
            if self.rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

/// Runs N concurrent round trips and evaluates them.
pub struct LoadHarness {
    client: Arc<RoundTripClient>,
    prompt: String,
    max_in_flight: Option<usize>,
}

impl LoadHarness {
    pub fn new(client: Arc<RoundTripClient>) -> Self {
        Self {
            client,
            prompt: DEFAULT_PROMPT.to_string(),
            max_in_flight: None,
        }
    }

    /// Prompt sent by every unit; empty falls back to [`DEFAULT_PROMPT`].
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.prompt = if prompt.is_empty() {
            DEFAULT_PROMPT.to_string()
        } else {
            prompt
        };
        self
    }

    /// Cap how many units may be in a call at once. `None` launches all N together.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Run `concurrency` units against `target` and evaluate against `sla_bound`.
    ///
    /// Always waits for every unit; never stops at the first failure.
    pub async fn run(
        &self,
        target: &Target,
        concurrency: usize,
        sla_bound: Duration,
    ) -> HarnessResult<RunResult> {
        self.run_with_cancel(target, concurrency, sla_bound, CancelSignal::never())
            .await
    }

    /// Like [`run`](Self::run), but stops in-flight calls when `cancel` fires.
    ///
    /// A cancelled run is returned with [`Completion::Cancelled`] and only the
    /// observations of units that finished.
    pub async fn run_with_cancel(
        &self,
        target: &Target,
        concurrency: usize,
        sla_bound: Duration,
        cancel: CancelSignal,
    ) -> HarnessResult<RunResult> {
        if concurrency == 0 {
            return Err(HarnessError::invalid_config("concurrency must be > 0"));
        }
        if sla_bound.is_zero() {
            return Err(HarnessError::invalid_config("sla_bound must be > 0"));
        }
        if self.max_in_flight == Some(0) {
            return Err(HarnessError::invalid_config("max_in_flight must be > 0"));
        }

        info!(
            endpoint = %target,
            concurrency,
            ?sla_bound,
            max_in_flight = ?self.max_in_flight,
            "Starting load run"
        );

        let semaphore = self.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        let target = Arc::new(target.clone());
        let prompt: Arc<str> = Arc::from(self.prompt.as_str());
        let started = Instant::now();

        let mut join_set = JoinSet::new();
        for unit in 0..concurrency {
            let client = Arc::clone(&self.client);
            let target = Arc::clone(&target);
            let prompt = Arc::clone(&prompt);
            let semaphore = semaphore.clone();
            let mut cancel = cancel.clone();

            join_set.spawn(async move {
                let work = async {
                    let _permit = match &semaphore {
                        Some(semaphore) => Some(semaphore.acquire().await),
                        None => None,
                    };
                    call_catching_panics(&client, &target, &prompt, unit).await
                };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    observation = work => Some(observation),
                }
            });
        }

        let mut run = LoadRun::new((*target).clone(), concurrency, sla_bound);
        let mut cancelled_units = 0usize;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some(observation)) => run.record(observation),
                Ok(None) => cancelled_units += 1,
                Err(e) => {
                    return Err(HarnessError::UnitLost(format!("unit task failed: {}", e)));
                }
            }
        }
        let elapsed = started.elapsed();

        if run.observations().len() + cancelled_units != concurrency {
            return Err(HarnessError::UnitLost(format!(
                "{} observations and {} cancellations for {} units",
                run.observations().len(),
                cancelled_units,
                concurrency
            )));
        }

        let completion = if cancelled_units > 0 {
            warn!(missing = cancelled_units, "Load run cancelled before completion");
            Completion::Cancelled {
                missing: cancelled_units,
            }
        } else {
            Completion::Complete
        };

        let violations = run.evaluate();
        let result = RunResult {
            run,
            violations,
            completion,
            elapsed,
        };

        info!(
            verdict = %result.verdict(),
            observations = result.observations().len(),
            violations = result.violations.len(),
            max_latency = ?result.max_latency(),
            ?elapsed,
            "Load run evaluated"
        );

        Ok(result)
    }
}

/// Run one call, turning a panic that escapes the client (a recorder, say) into
/// a failed observation so the unit still reports.
async fn call_catching_panics(
    client: &RoundTripClient,
    target: &Target,
    prompt: &str,
    unit: usize,
) -> Observation {
    let start = Instant::now();
    match AssertUnwindSafe(client.call(target, prompt, unit))
        .catch_unwind()
        .await
    {
        Ok(observation) => observation,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            debug!(unit, %message, "Unit panicked");
            Observation {
                unit,
                duration: start.elapsed(),
                outcome: Outcome::Failure(CallError::Panicked(message)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpGenerationBackend;

    #[test]
    fn test_empty_prompt_uses_default() {
        let backend = Arc::new(HttpGenerationBackend::new(Duration::from_secs(1)).unwrap());
        let client = Arc::new(RoundTripClient::new(backend));

        let harness = LoadHarness::new(Arc::clone(&client)).with_prompt("");
        assert_eq!(harness.prompt(), DEFAULT_PROMPT);

        let harness = LoadHarness::new(client).with_prompt("time.now()");
        assert_eq!(harness.prompt(), "time.now()");
    }

    #[tokio::test]
    async fn test_cancel_signal() {
        let (handle, mut signal) = CancelSignal::channel();
        assert!(!signal.is_cancelled());

        handle.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_signal_pends() {
        let mut signal = CancelSignal::never();
        let fired = tokio::time::timeout(Duration::from_secs(60), signal.cancelled()).await;
        assert!(fired.is_err());
    }
}
