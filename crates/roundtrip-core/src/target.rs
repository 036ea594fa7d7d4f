//! Call targets for round-trip measurement

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default generation endpoint.
pub const DEFAULT_GENERATE_URL: &str = "http://ollama:11434/api/generate";

/// Default model identity sent with generation requests.
pub const DEFAULT_MODEL: &str = "qwen2.5-coder:7b";

/// Shape of the request a target expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKind {
    /// Generation API taking `{model, prompt, stream}` and answering `{response}`.
    Generate {
        /// Model identity placed in the request body.
        model: String,
    },

    /// Agent endpoint taking `{prompt}`; the whole body is the payload.
    AgentSend,
}

/// Endpoint a load run is aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Absolute URL the request is posted to.
    pub endpoint: String,

    /// Request/response shape.
    #[serde(flatten)]
    pub kind: TargetKind,
}

impl Target {
    /// Target a generation endpoint with the given model.
    pub fn generate(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind: TargetKind::Generate {
                model: model.into(),
            },
        }
    }

    /// Target a discovered agent's send endpoint.
    pub fn agent_send(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind: TargetKind::AgentSend,
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::generate(DEFAULT_GENERATE_URL, DEFAULT_MODEL)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TargetKind::Generate { model } => write!(f, "{} ({})", self.endpoint, model),
            TargetKind::AgentSend => write!(f, "{} (agent)", self.endpoint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target() {
        let target = Target::default();
        assert_eq!(target.endpoint, DEFAULT_GENERATE_URL);
        assert_eq!(
            target.kind,
            TargetKind::Generate {
                model: DEFAULT_MODEL.to_string()
            }
        );
        assert_eq!(
            target.to_string(),
            "http://ollama:11434/api/generate (qwen2.5-coder:7b)"
        );
    }

    #[test]
    fn test_target_serialization() {
        let target = Target::agent_send("http://localhost:8000/agents/abc/send");
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["kind"], "agent_send");
        assert_eq!(json["endpoint"], "http://localhost:8000/agents/abc/send");
    }
}
