//! Observations, load runs and SLA evaluation

use crate::error::CallError;
use crate::target::Target;
use std::fmt;
use std::time::Duration;

/// Result of one call: the decoded payload or the error that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Failure(CallError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Timed outcome of one call made by one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Index of the unit that produced this observation (0..N).
    pub unit: usize,

    /// Full request/response cycle, including body decode.
    pub duration: Duration,

    pub outcome: Outcome,
}

/// A single reason a run failed its SLA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlaViolation {
    /// A successful call took strictly longer than the bound.
    LatencyExceeded {
        unit: usize,
        observed: Duration,
        bound: Duration,
    },

    /// A call failed outright.
    CallFailed { unit: usize, error: CallError },
}

impl SlaViolation {
    /// Unit that produced the offending observation.
    pub fn unit(&self) -> usize {
        match self {
            Self::LatencyExceeded { unit, .. } | Self::CallFailed { unit, .. } => *unit,
        }
    }
}

impl fmt::Display for SlaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatencyExceeded {
                unit,
                observed,
                bound,
            } => write!(
                f,
                "unit {unit}: latency {observed:?} exceeds bound {bound:?}"
            ),
            Self::CallFailed { unit, error } => write!(f, "unit {unit}: call failed: {error}"),
        }
    }
}

/// Evaluate observations against an SLA bound.
///
/// Every observation is checked; the returned violations are sorted by unit so
/// the result does not depend on collection order. A duration equal to the
/// bound is compliant.
pub fn evaluate(observations: &[Observation], sla_bound: Duration) -> Vec<SlaViolation> {
    let mut violations: Vec<SlaViolation> = observations
        .iter()
        .filter_map(|obs| match &obs.outcome {
            Outcome::Failure(error) => Some(SlaViolation::CallFailed {
                unit: obs.unit,
                error: error.clone(),
            }),
            Outcome::Success(_) if obs.duration > sla_bound => {
                Some(SlaViolation::LatencyExceeded {
                    unit: obs.unit,
                    observed: obs.duration,
                    bound: sla_bound,
                })
            }
            Outcome::Success(_) => None,
        })
        .collect();

    violations.sort_by_key(SlaViolation::unit);
    violations
}

/// One execution of the harness: N units against a fixed target and bound.
#[derive(Debug, Clone)]
pub struct LoadRun {
    pub target: Target,
    pub concurrency: usize,
    pub sla_bound: Duration,
    observations: Vec<Observation>,
}

impl LoadRun {
    pub fn new(target: Target, concurrency: usize, sla_bound: Duration) -> Self {
        Self {
            target,
            concurrency,
            sla_bound,
            observations: Vec::with_capacity(concurrency),
        }
    }

    /// Append the observation reported by one unit.
    pub fn record(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Number of spawned units that have not reported.
    pub fn missing(&self) -> usize {
        self.concurrency.saturating_sub(self.observations.len())
    }

    pub fn evaluate(&self) -> Vec<SlaViolation> {
        evaluate(&self.observations, self.sla_bound)
    }
}

/// Whether every spawned unit reported before evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Complete,
    /// Run was cancelled; `missing` units never reported.
    Cancelled { missing: usize },
}

/// Final pass/fail decision for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// Cancelled before all units reported and no violation seen so far.
    Incomplete,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Incomplete => "INCOMPLETE",
        };
        f.write_str(s)
    }
}

/// Evaluated load run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run: LoadRun,
    pub violations: Vec<SlaViolation>,
    pub completion: Completion,
    /// Wall-clock time from first spawn to last join.
    pub elapsed: Duration,
}

impl RunResult {
    pub fn verdict(&self) -> Verdict {
        if !self.violations.is_empty() {
            Verdict::Fail
        } else if self.completion != Completion::Complete {
            Verdict::Incomplete
        } else {
            Verdict::Pass
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict() == Verdict::Pass
    }

    pub fn observations(&self) -> &[Observation] {
        self.run.observations()
    }

    pub fn success_count(&self) -> usize {
        self.observations()
            .iter()
            .filter(|o| o.outcome.is_success())
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.observations().len() - self.success_count()
    }

    /// Slowest observed call across all outcomes.
    pub fn max_latency(&self) -> Duration {
        self.observations()
            .iter()
            .map(|o| o.duration)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn latency_violations(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| matches!(v, SlaViolation::LatencyExceeded { .. }))
            .count()
    }

    pub fn call_failures(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| matches!(v, SlaViolation::CallFailed { .. }))
            .count()
    }
}
