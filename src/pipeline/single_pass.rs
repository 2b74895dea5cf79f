//! One remote call over a sample of the whole request.

use super::prompts::single_pass_prompt;
use super::{finish_report, PipelineError};
use crate::analysis::{build_lineage, ConfidenceCalculator};
use crate::config::InsightsConfig;
use crate::models::{AnalysisInputs, AnalysisReport, ReportOrigin};
use crate::remote::{call_with_timeout, RemoteModelClient};
use crate::validation::ReportValidator;
use std::sync::Arc;
use std::time::Duration;

pub struct SinglePassAnalysis {
    client: Arc<dyn RemoteModelClient>,
    validator: Arc<dyn ReportValidator>,
    record_limit: usize,
    timeout: Duration,
    confidence: ConfidenceCalculator,
}

impl SinglePassAnalysis {
    pub fn new(
        client: Arc<dyn RemoteModelClient>,
        validator: Arc<dyn ReportValidator>,
        config: &InsightsConfig,
    ) -> Self {
        Self {
            client,
            validator,
            record_limit: config.remote.single_pass_record_limit,
            timeout: config.remote.request_timeout(),
            confidence: ConfidenceCalculator::new(config.confidence.clone()),
        }
    }

    pub async fn run(&self, inputs: &AnalysisInputs) -> Result<AnalysisReport, PipelineError> {
        if inputs.is_empty() {
            return Err(PipelineError::InsufficientData);
        }

        let prompt = single_pass_prompt(inputs, self.record_limit);
        let raw = call_with_timeout(self.client.as_ref(), &prompt, self.timeout)
            .await
            .map_err(PipelineError::RemoteFailed)?;

        crate::log_pipeline!(
            debug,
            "single_pass",
            student_id = %inputs.student_id,
            records = inputs.record_count(),
            "Remote single-pass call returned"
        );

        finish_report(
            self.validator.validate(&raw),
            inputs,
            build_lineage(inputs),
            ReportOrigin::RemoteSinglePass,
            &self.confidence,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmotionEntry;
    use crate::remote::{Prompt, RemoteCallError};
    use crate::validation::SchemaRepairValidator;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Value};

    struct FixedClient(Result<Value, RemoteCallError>);

    #[async_trait]
    impl RemoteModelClient for FixedClient {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn chat_json(&self, _prompt: &Prompt) -> Result<Value, RemoteCallError> {
            self.0.clone()
        }
    }

    fn inputs() -> AnalysisInputs {
        let mut inputs = AnalysisInputs::new("s1");
        inputs.emotions.push(EmotionEntry {
            id: "e1".into(),
            student_id: "s1".into(),
            timestamp: Utc::now(),
            emotion: "calm".into(),
            intensity: None,
            triggers: vec![],
        });
        inputs
    }

    fn analysis(reply: Result<Value, RemoteCallError>) -> SinglePassAnalysis {
        SinglePassAnalysis::new(
            Arc::new(FixedClient(reply)),
            Arc::new(SchemaRepairValidator),
            &InsightsConfig::for_test(),
        )
    }

    #[tokio::test]
    async fn test_single_pass_report() {
        let report = analysis(Ok(json!({"keyFindings": ["Calm overall"], "confidence": {"overall": 0.99}})))
            .run(&inputs())
            .await
            .unwrap();
        assert_eq!(report.origin, ReportOrigin::RemoteSinglePass);
        assert_eq!(report.key_findings, vec!["Calm overall"]);
        assert_eq!(report.data_lineage.len(), 1);
        assert!(report.confidence.overall < 0.99, "confidence is recomputed locally");
    }

    #[tokio::test]
    async fn test_remote_failure_is_reported() {
        let err = analysis(Err(RemoteCallError::Transport("down".into())))
            .run(&inputs())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RemoteFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_inputs_skip_the_call() {
        let err = analysis(Ok(json!({})))
            .run(&AnalysisInputs::new("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData));
    }
}
