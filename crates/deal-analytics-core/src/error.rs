use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Invalid input: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("IRR undefined: cash flows never change sign")]
    NoSignChange,

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    NonConvergent {
        function: String,
        iterations: u32,
        last_delta: f64,
    },

    #[error("Analysis timed out after {limit_ms} ms")]
    AnalysisTimeout { limit_ms: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification used when a failure is reported inside a result
/// instead of aborting the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    RateSolver,
    Timeout,
    Internal,
}

impl EngineError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::Validation { .. } => ErrorClass::Validation,
            EngineError::NoSignChange | EngineError::NonConvergent { .. } => {
                ErrorClass::RateSolver
            }
            EngineError::AnalysisTimeout { .. } => ErrorClass::Timeout,
            EngineError::Serialization(_) => ErrorClass::Internal,
        }
    }

    /// Errors that must abort the whole request rather than being recorded
    /// against a single variable or scenario.
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Timeout)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
