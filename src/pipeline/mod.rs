//! # Remote Analysis Pipelines
//!
//! Single-pass and map-reduce analysis through a [`RemoteModelClient`].
//! Both produce a validated [`AnalysisReport`] whose lineage and confidence
//! are computed locally from the data, never taken from the model.
//!
//! [`RemoteModelClient`]: crate::remote::RemoteModelClient

pub mod chunked;
pub mod chunking;
pub mod prompts;
pub mod single_pass;
pub mod strategy;

pub use chunked::ChunkedAnalysisPipeline;
pub use chunking::{choose_chunk_span_days, partition};
pub use single_pass::SinglePassAnalysis;
pub use strategy::{requires_chunking, select_strategy, AnalysisStrategy};

use crate::analysis::{ConfidenceCalculator, DegradationFlags};
use crate::error::InsightsError;
use crate::models::{AnalysisInputs, AnalysisReport, DataLineageItem, ReportOrigin};
use crate::remote::RemoteCallError;
use crate::validation::ValidationOutcome;
use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No data to summarize in the requested range")]
    InsufficientData,

    #[error("Summarization of window {index} failed: {source}")]
    ChunkFailed {
        index: usize,
        #[source]
        source: RemoteCallError,
    },

    #[error("Reduce call failed: {0}")]
    ReduceFailed(#[source] RemoteCallError),

    #[error("Remote analysis call failed: {0}")]
    RemoteFailed(#[source] RemoteCallError),

    #[error("Model output failed validation: {0}")]
    ValidationFailed(String),

    #[error("Failed to build prompt: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<PipelineError> for InsightsError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ValidationFailed(reason) => InsightsError::SchemaValidationFailure(reason),
            PipelineError::Serialization(e) => InsightsError::Serialization(e.to_string()),
            other => InsightsError::RemoteCallFailure(other.to_string()),
        }
    }
}

/// Turn a validation outcome into the final report: local lineage,
/// recomputed confidence, origin and caveats.
pub(crate) fn finish_report(
    outcome: ValidationOutcome,
    inputs: &AnalysisInputs,
    lineage: Vec<DataLineageItem>,
    origin: ReportOrigin,
    confidence: &ConfidenceCalculator,
) -> Result<AnalysisReport, PipelineError> {
    let (mut report, repaired, caveats) = match outcome {
        ValidationOutcome::Valid {
            report,
            repaired,
            caveats,
        } => (report, repaired, caveats),
        ValidationOutcome::Invalid { error } => return Err(PipelineError::ValidationFailed(error)),
    };

    for caveat in caveats {
        report.add_caveat(caveat);
    }
    report.data_lineage = lineage;
    report.origin = origin;
    report.confidence = confidence.compute(
        inputs,
        DegradationFlags {
            repaired,
            used_fallback: false,
        },
        Utc::now(),
    );
    Ok(report.normalized())
}
