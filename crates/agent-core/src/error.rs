//! Execution error types.

use std::fmt;

/// Closed set of application-level failures reported by a reachable executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Credential rejected by the endpoint.
    Unauthorized,
    /// Endpoint is throttling requests.
    RateLimited,
    /// Request was rejected as invalid (unknown model, bad payload).
    InvalidRequest,
    /// Endpoint failed while producing the completion.
    Upstream,
    /// Response body could not be understood.
    MalformedResponse,
}

impl RemoteErrorKind {
    /// Classify an HTTP status code returned by the endpoint.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            429 => Self::RateLimited,
            400..=499 => Self::InvalidRequest,
            _ => Self::Upstream,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::InvalidRequest => "invalid_request",
            Self::Upstream => "upstream",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned when executing a single task.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Executor could not be reached.
    #[error("{0}")]
    Transport(String),

    /// Executor was reached but reported a failure.
    #[error("AI execution failed: {message}")]
    Remote {
        kind: RemoteErrorKind,
        message: String,
    },
}

impl ExecutionError {
    /// Build a remote failure.
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            kind,
            message: message.into(),
        }
    }

    /// Whether the executor was unreachable.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::remote(RemoteErrorKind::MalformedResponse, err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Result type for execution operations.
pub type Result<T> = std::result::Result<T, ExecutionError>;
