//! Per-window inputs and outputs of the chunked pipeline.

use super::records::{AnalysisInputs, EmotionEntry, SensoryEntry, TimeRange, TrackingEntry};
use super::report::{Anomaly, Correlation, Intervention, Pattern, PredictiveInsight};
use crate::constants::MAX_SUMMARY_ITEMS;
use serde::{Deserialize, Serialize};

/// The slice of a request that falls inside one window
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkContext {
    /// Position of the window in the full partition, empty windows included
    pub index: usize,
    pub range: TimeRange,
    pub entries: Vec<TrackingEntry>,
    pub emotions: Vec<EmotionEntry>,
    pub sensory_inputs: Vec<SensoryEntry>,
}

impl ChunkContext {
    pub fn record_count(&self) -> usize {
        self.entries.len() + self.emotions.len() + self.sensory_inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Re-wrap the window as a request so lineage helpers can run on it
    pub fn as_inputs(&self, student_id: &str) -> AnalysisInputs {
        AnalysisInputs {
            student_id: student_id.to_string(),
            entries: self.entries.clone(),
            emotions: self.emotions.clone(),
            sensory_inputs: self.sensory_inputs.clone(),
            goals: Vec::new(),
            time_range: Some(self.range),
        }
    }
}

/// Compact partial result for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkSummary {
    pub key_findings: Vec<String>,
    pub patterns: Vec<Pattern>,
    pub correlations: Vec<Correlation>,
    pub anomalies: Vec<Anomaly>,
    pub suggested_interventions: Vec<Intervention>,
    pub predictive_insights: Vec<PredictiveInsight>,
}

impl ChunkSummary {
    /// Cap every list so the reduce prompt stays within budget
    pub fn bounded(mut self) -> Self {
        self.key_findings.truncate(MAX_SUMMARY_ITEMS);
        self.patterns.truncate(MAX_SUMMARY_ITEMS);
        self.correlations.truncate(MAX_SUMMARY_ITEMS);
        self.anomalies.truncate(MAX_SUMMARY_ITEMS);
        self.suggested_interventions.truncate(MAX_SUMMARY_ITEMS);
        self.predictive_insights.truncate(MAX_SUMMARY_ITEMS);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.key_findings.is_empty()
            && self.patterns.is_empty()
            && self.correlations.is_empty()
            && self.anomalies.is_empty()
            && self.suggested_interventions.is_empty()
            && self.predictive_insights.is_empty()
    }
}
