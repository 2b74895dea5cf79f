//! # Chunked (map-reduce) analysis
//!
//! 1. Partition the range into windows sized by the span step function.
//! 2. Skip windows without records; no call is issued for them.
//! 3. Summarize each remaining window with its own timeout. Results are kept
//!    in chronological order even when windows run concurrently.
//! 4. Reduce all summaries in one call and validate the output.
//!
//! Any failed window aborts the run. Nothing is retried.

use super::chunking::{choose_chunk_span_days, partition};
use super::prompts::{chunk_prompt, reduce_prompt};
use super::{finish_report, PipelineError};
use crate::analysis::{build_lineage, merge_lineage, ConfidenceCalculator};
use crate::config::{ChunkingConfig, InsightsConfig};
use crate::constants::caveats;
use crate::models::{AnalysisInputs, AnalysisReport, ChunkContext, ChunkSummary, ReportOrigin};
use crate::remote::{call_with_timeout, RemoteCallError, RemoteModelClient};
use crate::validation::{parse_chunk_summary, ReportValidator};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ChunkedAnalysisPipeline {
    client: Arc<dyn RemoteModelClient>,
    validator: Arc<dyn ReportValidator>,
    chunking: ChunkingConfig,
    confidence: ConfidenceCalculator,
}

impl ChunkedAnalysisPipeline {
    pub fn new(
        client: Arc<dyn RemoteModelClient>,
        validator: Arc<dyn ReportValidator>,
        config: &InsightsConfig,
    ) -> Self {
        Self {
            client,
            validator,
            chunking: config.chunking.clone(),
            confidence: ConfidenceCalculator::new(config.confidence.clone()),
        }
    }

    pub async fn run(&self, inputs: &AnalysisInputs) -> Result<AnalysisReport, PipelineError> {
        let range = inputs.effective_range().ok_or(PipelineError::InsufficientData)?;
        let span_days = choose_chunk_span_days(range.span_days(), &self.chunking);
        let windows = partition(inputs, range, span_days);
        let window_count = windows.len();
        let non_empty: Vec<ChunkContext> = windows.into_iter().filter(|w| !w.is_empty()).collect();

        crate::log_pipeline!(
            info,
            "partition",
            student_id = %inputs.student_id,
            span_days = span_days,
            windows = window_count,
            non_empty = non_empty.len(),
            "Partitioned request into windows"
        );

        if non_empty.is_empty() {
            return Err(PipelineError::InsufficientData);
        }

        let concurrency = self.chunking.max_concurrent_chunks.max(1);
        let summaries: Vec<ChunkSummary> = futures::stream::iter(non_empty.iter())
            .map(|chunk| self.summarize(chunk, inputs))
            .buffered(concurrency)
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .filter(|summary| !summary.is_empty())
            .collect();

        if summaries.is_empty() {
            return Err(PipelineError::InsufficientData);
        }

        let prompt = reduce_prompt(&summaries, &range, self.chunking.max_reduce_payload_chars)?;
        let raw = call_with_timeout(self.client.as_ref(), &prompt, self.chunking.reduce_timeout())
            .await
            .map_err(|e| {
                warn!(error = %e, summaries = summaries.len(), "Reduce call failed");
                PipelineError::ReduceFailed(e)
            })?;

        let lineage = merge_lineage(
            non_empty
                .iter()
                .flat_map(|chunk| build_lineage(&chunk.as_inputs(&inputs.student_id))),
        );
        let mut report = finish_report(
            self.validator.validate(&raw),
            inputs,
            lineage,
            ReportOrigin::RemoteChunked,
            &self.confidence,
        )?;
        report.add_caveat(caveats::MAP_REDUCE);

        crate::log_pipeline!(
            info,
            "reduce",
            student_id = %inputs.student_id,
            summaries = summaries.len(),
            "Map-reduce analysis complete"
        );
        Ok(report)
    }

    async fn summarize(
        &self,
        chunk: &ChunkContext,
        inputs: &AnalysisInputs,
    ) -> Result<ChunkSummary, PipelineError> {
        let prompt = chunk_prompt(chunk, &inputs.goals, self.chunking.sample_per_collection);
        let fail = |source: RemoteCallError| PipelineError::ChunkFailed {
            index: chunk.index,
            source,
        };

        let raw = call_with_timeout(self.client.as_ref(), &prompt, self.chunking.chunk_timeout())
            .await
            .map_err(fail)?;
        let summary =
            parse_chunk_summary(&raw).map_err(|reason| fail(RemoteCallError::MalformedOutput(reason)))?;

        debug!(
            index = chunk.index,
            records = chunk.record_count(),
            findings = summary.key_findings.len(),
            "Window summarized"
        );
        Ok(summary)
    }
}
