//! Error types for the insights orchestrator.
//!
//! Only [`InsightsError::InvalidInput`] (and configuration failures at
//! construction time) ever reach a caller of `submit`. Every other variant is
//! recovered locally into a caveated best-effort report.

use crate::config::ConfigurationError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InsightsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Background unit unavailable: {0}")]
    BackgroundUnitUnavailable(String),
    #[error("Background unit timed out after {0:?}")]
    BackgroundUnitTimeout(Duration),
    #[error("Background unit runtime error: {0}")]
    BackgroundUnitRuntimeError(String),
    #[error("Remote call failure: {0}")]
    RemoteCallFailure(String),
    #[error("Schema validation failure: {0}")]
    SchemaValidationFailure(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl InsightsError {
    /// Whether this error must be surfaced to the caller instead of being
    /// recovered into a fallback report.
    pub fn is_hard_error(&self) -> bool {
        matches!(
            self,
            InsightsError::InvalidInput(_)
                | InsightsError::Configuration(_)
                | InsightsError::Serialization(_)
        )
    }

    /// Short machine-friendly label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InsightsError::InvalidInput(_) => "invalid_input",
            InsightsError::BackgroundUnitUnavailable(_) => "background_unit_unavailable",
            InsightsError::BackgroundUnitTimeout(_) => "background_unit_timeout",
            InsightsError::BackgroundUnitRuntimeError(_) => "background_unit_runtime_error",
            InsightsError::RemoteCallFailure(_) => "remote_call_failure",
            InsightsError::SchemaValidationFailure(_) => "schema_validation_failure",
            InsightsError::Configuration(_) => "configuration",
            InsightsError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for InsightsError {
    fn from(error: serde_json::Error) -> Self {
        InsightsError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for InsightsError {
    fn from(error: ConfigurationError) -> Self {
        InsightsError::Configuration(error.to_string())
    }
}

pub type InsightsResult<T> = Result<T, InsightsError>;
