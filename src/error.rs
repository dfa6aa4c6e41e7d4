//! Error types for the analysis pipeline.
//!
//! `AnalyzerError` is `Clone` so that one computation failure can be handed to
//! every caller that was waiting on the same key.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyzerError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Computation error: {0}")]
    ComputationError(String),
    #[error("Timeout error for operation {operation}: {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification surfaced to the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input, detected before any cache or provider interaction
    Validation,
    /// The provider call failed, timed out, or the computation task died
    Computation,
    /// The observing caller gave up; the computation itself may still be running
    Cancelled,
    /// The pipeline could not be constructed
    Configuration,
}

impl AnalyzerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalyzerError::ValidationError(_) => ErrorKind::Validation,
            AnalyzerError::ComputationError(_)
            | AnalyzerError::Timeout { .. }
            | AnalyzerError::Internal(_) => ErrorKind::Computation,
            AnalyzerError::Cancelled(_) => ErrorKind::Cancelled,
            AnalyzerError::ConfigurationError(_) => ErrorKind::Configuration,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AnalyzerError::ValidationError(message.into())
    }

    pub fn computation(message: impl Into<String>) -> Self {
        AnalyzerError::ComputationError(message.into())
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        AnalyzerError::Timeout {
            operation: operation.into(),
            timeout,
        }
    }
}

impl From<crate::config::ConfigurationError> for AnalyzerError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        AnalyzerError::ConfigurationError(error.to_string())
    }
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(error: reqwest::Error) -> Self {
        AnalyzerError::ComputationError(format!("HTTP request failed: {error}"))
    }
}

impl From<serde_json::Error> for AnalyzerError {
    fn from(error: serde_json::Error) -> Self {
        AnalyzerError::ComputationError(format!("JSON serialization error: {error}"))
    }
}

pub type AnalyzerResult<T> = std::result::Result<T, AnalyzerError>;
