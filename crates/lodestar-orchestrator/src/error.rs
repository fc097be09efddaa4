// Error types for tool orchestration

use lodestar_abstraction::ModelError;
use lodestar_core::CoreError;
use std::fmt;
use thiserror::Error;

use crate::tool::ToolId;

/// Errors raised from inside a tool's analysis logic.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The run's cancellation signal fired at a checkpoint.
    ///
    /// Converted to a `cancelled` result by the run harness, never reported
    /// as a failure.
    #[error("Tool run cancelled")]
    Cancelled,

    /// The tool needs a model provider but none was supplied.
    #[error("No model provider available")]
    MissingProvider,

    /// Model error
    #[error("Model error: {0}")]
    Model(ModelError),

    /// Version-control or configuration error from the core services
    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid tool arguments
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument {
        /// Argument name
        name: String,
        /// Reason why it was rejected
        reason: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<ModelError> for ToolError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Cancelled => Self::Cancelled,
            other => Self::Model(other),
        }
    }
}

impl ToolError {
    /// Returns `true` for the cancellation sentinel.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Stable codes carried by [`PolicyRejection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionCode {
    /// The permission predicate refused the command.
    PermissionDenied,
    /// The command exceeded its per-second ceiling.
    RateLimitExceeded,
}

impl RejectionCode {
    /// Returns the wire code, e.g. `PERMISSION_DENIED`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline middleware refused to let a command through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct PolicyRejection {
    /// Stable rejection code.
    pub code: RejectionCode,
    /// Human-readable message.
    pub message: String,
    /// The offending command name.
    pub command: String,
}

impl PolicyRejection {
    /// Builds a `PERMISSION_DENIED` rejection.
    pub fn permission_denied(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            code: RejectionCode::PermissionDenied,
            message: format!("Permission denied for command '{command}'"),
            command,
        }
    }

    /// Builds a `RATE_LIMIT_EXCEEDED` rejection.
    pub fn rate_limit_exceeded(command: impl Into<String>, limit: usize) -> Self {
        let command = command.into();
        Self {
            code: RejectionCode::RateLimitExceeded,
            message: format!("Rate limit of {limit} calls per second exceeded for '{command}'"),
            command,
        }
    }
}

/// Configuration errors reported by the runner before any run starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// No tool is registered under this id.
    #[error("Unknown tool '{0}'")]
    UnknownTool(ToolId),

    /// No workspace root could be resolved.
    #[error("No workspace folder is open")]
    NoWorkspace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_cancellation_maps_to_cancelled() {
        assert!(ToolError::from(ModelError::Cancelled).is_cancelled());
        assert!(matches!(
            ToolError::from(ModelError::Timeout(5)),
            ToolError::Model(ModelError::Timeout(5))
        ));
    }

    #[test]
    fn test_rejection_codes() {
        let denied = PolicyRejection::permission_denied("git.commit");
        assert_eq!(denied.code.as_str(), "PERMISSION_DENIED");
        assert_eq!(denied.command, "git.commit");
        assert!(denied.to_string().starts_with("PERMISSION_DENIED:"));

        let limited = PolicyRejection::rate_limit_exceeded("tools.lint", 2);
        assert_eq!(limited.code, RejectionCode::RateLimitExceeded);
        assert!(limited.message.contains("2 calls"));
    }

    #[test]
    fn test_runner_error_display() {
        assert_eq!(RunnerError::UnknownTool(ToolId::Lint).to_string(), "Unknown tool 'lint'");
        assert_eq!(RunnerError::NoWorkspace.to_string(), "No workspace folder is open");
    }
}
