//! # Fallback Compute Engine
//!
//! In-process computation used whenever the background context or the
//! remote model cannot serve a request. Engines never fail: internal trouble
//! yields [`AnalysisReport::unavailable`] instead of an error.

use crate::analysis::confidence::{ConfidenceCalculator, DegradationFlags};
use crate::analysis::lineage::build_lineage;
use crate::config::ConfidenceConfig;
use crate::constants::caveats;
use crate::models::{AnalysisInputs, AnalysisReport, Pattern, ReportOrigin, Severity};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;

/// Why a request ended up on the fallback path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackReason {
    WorkerDisabled,
    /// Circuit open or no context could be started
    WorkerUnavailable,
    WatchdogTimeout,
    WorkerRuntimeError,
    RemoteFailure,
    InsufficientData,
}

impl FallbackReason {
    /// Caveat attached to reports produced for this reason
    pub fn caveat(&self) -> &'static str {
        match self {
            FallbackReason::WorkerDisabled => caveats::WORKER_DISABLED_FALLBACK,
            FallbackReason::WorkerUnavailable => caveats::WORKER_UNAVAILABLE_FALLBACK,
            FallbackReason::WatchdogTimeout => caveats::WORKER_TIMEOUT_FALLBACK,
            FallbackReason::WorkerRuntimeError => caveats::WORKER_ERROR_FALLBACK,
            FallbackReason::RemoteFailure => caveats::REMOTE_FAILED_FALLBACK,
            FallbackReason::InsufficientData => caveats::INSUFFICIENT_DATA,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::WorkerDisabled => "worker_disabled",
            FallbackReason::WorkerUnavailable => "worker_unavailable",
            FallbackReason::WatchdogTimeout => "watchdog_timeout",
            FallbackReason::WorkerRuntimeError => "worker_runtime_error",
            FallbackReason::RemoteFailure => "remote_failure",
            FallbackReason::InsufficientData => "insufficient_data",
        }
    }
}

#[async_trait]
pub trait FallbackEngine: Send + Sync {
    async fn compute(&self, inputs: &AnalysisInputs, reason: FallbackReason) -> AnalysisReport;
}

/// Run the engine and bring its output into the shape every cache write
/// expects: origin set, reason caveat attached, numbers normalized.
pub async fn compute_fallback(
    engine: &dyn FallbackEngine,
    inputs: &AnalysisInputs,
    reason: FallbackReason,
) -> AnalysisReport {
    let mut report = engine.compute(inputs, reason).await;
    report.origin = ReportOrigin::Fallback;
    report.add_caveat(reason.caveat());
    report.normalized()
}

/// Counting heuristics over the raw records
#[derive(Debug, Clone)]
pub struct HeuristicFallbackEngine {
    confidence: ConfidenceCalculator,
}

impl HeuristicFallbackEngine {
    pub fn new(settings: ConfidenceConfig) -> Self {
        Self {
            confidence: ConfidenceCalculator::new(settings),
        }
    }

    fn dominant<'a, I>(labels: I) -> Option<(String, usize, usize)>
    where
        I: Iterator<Item = &'a str>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut total = 0;
        for label in labels {
            *counts.entry(label).or_insert(0) += 1;
            total += 1;
        }
        // Ties resolve alphabetically so the output is deterministic
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(label, count)| (label.to_string(), count, total))
    }
}

#[async_trait]
impl FallbackEngine for HeuristicFallbackEngine {
    async fn compute(&self, inputs: &AnalysisInputs, _reason: FallbackReason) -> AnalysisReport {
        let mut report = AnalysisReport {
            data_lineage: build_lineage(inputs),
            ..AnalysisReport::default()
        };

        let emotions = inputs
            .emotions
            .iter()
            .chain(inputs.entries.iter().flat_map(|e| e.emotions.iter()))
            .map(|e| e.emotion.as_str());
        if let Some((emotion, count, total)) = Self::dominant(emotions) {
            report.patterns.push(Pattern {
                name: format!("Frequent emotion: {emotion}"),
                description: Some(format!("{count} of {total} emotion observations")),
                strength: count as f64 / total as f64,
                impact: None,
            });
            report
                .key_findings
                .push(format!("'{emotion}' is the most frequently recorded emotion"));
        }

        let sensory = inputs
            .sensory_inputs
            .iter()
            .chain(inputs.entries.iter().flat_map(|e| e.sensory_inputs.iter()))
            .map(|s| s.response.as_str());
        if let Some((response, count, total)) = Self::dominant(sensory) {
            let strength = count as f64 / total as f64;
            report.patterns.push(Pattern {
                name: format!("Frequent sensory response: {response}"),
                description: Some(format!("{count} of {total} sensory observations")),
                strength,
                impact: Some(if strength > 0.6 { Severity::High } else { Severity::Medium }),
            });
        }

        report.insights.push(format!(
            "Analysed {} sessions, {} emotion and {} sensory records.",
            inputs.entries.len(),
            inputs.emotions.len(),
            inputs.sensory_inputs.len()
        ));
        if inputs.is_empty() {
            report.add_caveat(caveats::LIMITED_DATA);
        }

        report.confidence = self.confidence.compute(
            inputs,
            DegradationFlags {
                repaired: false,
                used_fallback: true,
            },
            Utc::now(),
        );
        report
    }
}
