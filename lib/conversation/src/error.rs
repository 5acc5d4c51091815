//! Error types for the conversation crate.
//!
//! - `ToolError`: a single tool invocation failed
//! - `PipelineFailure`: a turn could not produce an answer

use std::fmt;

/// Errors from tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool not found.
    NotFound { name: String },
    /// Tool execution failed.
    ExecutionFailed { name: String, reason: String },
    /// Invalid tool input.
    InvalidInput { name: String, reason: String },
}

impl ToolError {
    /// Convenience constructor for bad input.
    #[must_use]
    pub fn invalid_input(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for a failed invocation.
    #[must_use]
    pub fn execution_failed(name: &str, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "tool not found: {name}"),
            Self::ExecutionFailed { name, reason } => {
                write!(f, "tool '{name}' execution failed: {reason}")
            }
            Self::InvalidInput { name, reason } => {
                write!(f, "invalid input for tool '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for ToolError {}

/// Why the model pipeline produced no answer for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineFailure {
    /// The model backend failed.
    Backend { reason: String },
    /// The model kept calling tools past the iteration budget.
    IterationLimit { max: u32 },
    /// The model answered with nothing.
    EmptyResponse,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { reason } => write!(f, "{reason}"),
            Self::IterationLimit { max } => {
                write!(f, "agent stopped after {max} iterations without a final answer")
            }
            Self::EmptyResponse => write!(f, "model returned an empty response"),
        }
    }
}

impl std::error::Error for PipelineFailure {}
