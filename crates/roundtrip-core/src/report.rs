//! Report generation for load run results

use crate::observation::{Completion, RunResult, SlaViolation};
use serde::Serialize;
use std::fmt::Write as _;
use std::str::FromStr;

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" | "text" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

/// Serializable summary of one evaluated run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: String,
    pub verdict: String,
    pub concurrency: usize,
    pub sla_bound_ms: f64,
    pub observations: usize,
    pub successful: usize,
    pub failed: usize,
    /// Units that never reported because the run was cancelled.
    pub missing: usize,
    pub max_latency_ms: f64,
    pub elapsed_ms: f64,
    pub violations: Vec<ViolationReport>,
}

/// One violation, flattened for output.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationReport {
    LatencyExceeded {
        unit: usize,
        observed_ms: f64,
        bound_ms: f64,
    },
    CallFailed {
        unit: usize,
        error: String,
    },
}

impl From<&SlaViolation> for ViolationReport {
    fn from(violation: &SlaViolation) -> Self {
        match violation {
            SlaViolation::LatencyExceeded {
                unit,
                observed,
                bound,
            } => Self::LatencyExceeded {
                unit: *unit,
                observed_ms: observed.as_secs_f64() * 1000.0,
                bound_ms: bound.as_secs_f64() * 1000.0,
            },
            SlaViolation::CallFailed { unit, error } => Self::CallFailed {
                unit: *unit,
                error: error.to_string(),
            },
        }
    }
}

impl RunReport {
    pub fn new(result: &RunResult) -> Self {
        let missing = match result.completion {
            Completion::Complete => 0,
            Completion::Cancelled { missing } => missing,
        };

        Self {
            target: result.run.target.to_string(),
            verdict: result.verdict().to_string(),
            concurrency: result.run.concurrency,
            sla_bound_ms: result.run.sla_bound.as_secs_f64() * 1000.0,
            observations: result.observations().len(),
            successful: result.success_count(),
            failed: result.failure_count(),
            missing,
            max_latency_ms: result.max_latency().as_secs_f64() * 1000.0,
            elapsed_ms: result.elapsed.as_secs_f64() * 1000.0,
            violations: result.violations.iter().map(ViolationReport::from).collect(),
        }
    }

    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Markdown => self.generate_markdown(),
            ReportFormat::Json => self.generate_json(),
        }
    }

    fn generate_markdown(&self) -> String {
        let mut out = format!(
            r#"# Round-Trip Load Report

**Target**: {}
**Status**: {}

## Summary

- **Units**: {}
- **Observations**: {}
- **Successful**: {}
- **Failed**: {}
- **Missing**: {}
- **Max latency**: {:.2}ms
- **SLA bound**: {:.2}ms
- **Elapsed**: {:.2}ms

## Violations

"#,
            self.target,
            self.verdict,
            self.concurrency,
            self.observations,
            self.successful,
            self.failed,
            self.missing,
            self.max_latency_ms,
            self.sla_bound_ms,
            self.elapsed_ms,
        );

        if self.violations.is_empty() {
            out.push_str("No violations\n");
        } else {
            for violation in &self.violations {
                let _ = match violation {
                    ViolationReport::LatencyExceeded {
                        unit,
                        observed_ms,
                        bound_ms,
                    } => writeln!(
                        out,
                        "- unit {}: latency {:.2}ms exceeds {:.2}ms",
                        unit, observed_ms, bound_ms
                    ),
                    ViolationReport::CallFailed { unit, error } => {
                        writeln!(out, "- unit {}: {}", unit, error)
                    }
                };
            }
        }

        out
    }

    fn generate_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            tracing::error!("Failed to encode report: {}", e);
            String::from("{}")
        })
    }
}
