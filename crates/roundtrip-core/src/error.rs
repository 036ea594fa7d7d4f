use std::time::Duration;

use thiserror::Error;

/// Failure of a single round-trip call.
///
/// Captured per unit as a failed observation; never propagated out of the
/// harness on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Connection could not be established or broke mid-request.
    #[error("transport error: {0}")]
    Transport(String),

    /// Per-call timeout elapsed before the response was fully read.
    #[error("call timed out after {after:?}")]
    Timeout {
        /// Configured per-call timeout.
        after: Duration,
    },

    /// Service answered with a non-success HTTP status.
    #[error("service returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Service answered successfully but produced no output.
    #[error("service returned an empty response")]
    EmptyResponse,

    /// The unit panicked while performing the call.
    #[error("unit panicked: {0}")]
    Panicked(String),
}

impl CallError {
    /// Creates a `Status` variant, truncating long bodies.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        const MAX_BODY_CHARS: usize = 256;
        let body = body.into();
        let body = if body.chars().count() > MAX_BODY_CHARS {
            let mut truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
            truncated.push_str("...");
            truncated
        } else {
            body
        };
        Self::Status { status, body }
    }

    /// Returns true for connection and timeout failures.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

/// Errors that abort a load run before it can be evaluated.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Run parameters are unusable.
    #[error("invalid harness configuration: {0}")]
    InvalidConfig(String),

    /// A spawned unit vanished without producing an observation.
    #[error("unit lost: {0}")]
    UnitLost(String),

    /// The HTTP client could not be constructed.
    #[error("client setup failed: {0}")]
    Client(String),
}

impl HarnessError {
    /// Creates an `InvalidConfig` variant.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Convenient result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors raised while locating a call target on a listing endpoint.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Listing endpoint was unreachable.
    #[error("listing request failed: {0}")]
    Transport(String),

    /// Listing endpoint answered with a non-success status.
    #[error("listing endpoint returned status {0}")]
    Status(u16),

    /// Listing body was not a recognizable entity collection.
    #[error("listing decode failed: {0}")]
    Decode(String),

    /// No entity carried the requested name.
    #[error("no entity named `{role}` in listing")]
    NotFound {
        /// Name that was searched for.
        role: String,
    },
}
