//! Core error types.

use thiserror::Error;

/// Errors from the statechart runtime.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("invalid statechart document: {reason}")]
    Structural { reason: String },

    #[error("unknown state: {name}")]
    InvalidReference { name: String },

    #[error("state '{name}' is not a history state")]
    NotHistoryState { name: String },

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChartError {
    pub(crate) fn structural(reason: impl Into<String>) -> Self {
        ChartError::Structural {
            reason: reason.into(),
        }
    }

    /// Returns whether the error prevents a machine from being started.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChartError::Structural { .. } | ChartError::Json(_))
    }

    /// Returns a stable error code suitable for tooling output.
    pub fn error_code(&self) -> &'static str {
        match self {
            ChartError::Structural { .. } => "STRUCTURAL_ERROR",
            ChartError::InvalidReference { .. } => "INVALID_REFERENCE",
            ChartError::NotHistoryState { .. } => "INVALID_REFERENCE",
            ChartError::Evaluation(_) => "EVALUATION_ERROR",
            ChartError::Json(_) => "STRUCTURAL_ERROR",
        }
    }
}

/// Failure reported by an expression evaluator for a guard or an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct EvaluationError {
    pub reason: String,
}

impl EvaluationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
