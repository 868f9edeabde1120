// SPDX-License-Identifier: MIT

//! Typed error handling for stepflow-rs
//!
//! `WorkflowError` is the taxonomy a run can fail with; `StepflowError` wraps it
//! together with the I/O, parsing and configuration failures of the outer surfaces.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for stepflow-rs
#[derive(Debug, Error)]
pub enum StepflowError {
    /// Workflow definition or execution errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Configuration errors (invalid env vars, bad flags)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client construction errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Errors a workflow can fail with, at load time or while running
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    /// Malformed or incomplete definition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Condition operator outside {equals, greater-than, less-than}
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Step id referenced at traversal time but absent from the graph
    #[error("Step '{0}' not found")]
    NotFound(String),

    /// Non-success response (or no response at all) from an action target
    #[error("Request for step '{step_id}' failed{}: {reason}", status_suffix(.status))]
    Request {
        step_id: String,
        status: Option<u16>,
        reason: String,
    },

    /// Expression, template or condition evaluation failed
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// A step was visited more often than the configured bound
    #[error("Cycle limit exceeded: step '{step_id}' visited more than {limit} times")]
    CycleLimitExceeded { step_id: String, limit: u32 },

    /// Per-step or whole-run deadline elapsed
    #[error("Timeout in step '{step_id}' after {after:?}")]
    Timeout { step_id: String, after: Duration },
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }

    pub fn request(
        step_id: impl Into<String>,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Request {
            step_id: step_id.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Stable tag used in traces and transport responses
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "validation_error",
            WorkflowError::UnsupportedOperator(_) => "unsupported_operator_error",
            WorkflowError::NotFound(_) => "not_found_error",
            WorkflowError::Request { .. } => "request_error",
            WorkflowError::Evaluation(_) => "evaluation_error",
            WorkflowError::CycleLimitExceeded { .. } => "cycle_limit_exceeded",
            WorkflowError::Timeout { .. } => "timeout_error",
        }
    }

    /// True for errors caused by the definition itself rather than by running it
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WorkflowError::Validation(_) | WorkflowError::UnsupportedOperator(_)
        )
    }

    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|s| format!(" with status {}", s))
        .unwrap_or_default()
}

/// Serializable form of a `WorkflowError`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl StepflowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for StepflowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for StepflowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
