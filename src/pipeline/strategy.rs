//! Which compute path a request takes.

use crate::config::{ChunkingConfig, InsightsConfig};
use crate::models::{AnalysisInputs, SubmitOptions};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStrategy {
    /// Background context, falling back in-process
    Worker,
    RemoteSinglePass,
    RemoteChunked,
}

impl AnalysisStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStrategy::Worker => "worker",
            AnalysisStrategy::RemoteSinglePass => "remote_single_pass",
            AnalysisStrategy::RemoteChunked => "remote_chunked",
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, AnalysisStrategy::Worker)
    }
}

impl fmt::Display for AnalysisStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Long spans and large record counts are split into windows
pub fn requires_chunking(inputs: &AnalysisInputs, chunking: &ChunkingConfig) -> bool {
    let span_days = inputs.effective_range().map_or(0, |r| r.span_days());
    span_days > i64::from(chunking.long_horizon_days)
        || inputs.record_count() > chunking.max_records_single_pass
}

/// Remote paths need both the caller's opt-in and remote support enabled
pub fn select_strategy(
    inputs: &AnalysisInputs,
    options: &SubmitOptions,
    config: &InsightsConfig,
) -> AnalysisStrategy {
    if !(options.use_remote_model && config.remote.enabled) {
        return AnalysisStrategy::Worker;
    }
    if requires_chunking(inputs, &config.chunking) {
        AnalysisStrategy::RemoteChunked
    } else {
        AnalysisStrategy::RemoteSinglePass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeRange;
    use chrono::{Duration, TimeZone, Utc};

    fn inputs_spanning(days: i64) -> AnalysisInputs {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut inputs = AnalysisInputs::new("s1");
        inputs.time_range = Some(TimeRange::new(start, start + Duration::days(days)));
        inputs
    }

    #[test]
    fn test_long_horizon_requires_chunking() {
        let chunking = ChunkingConfig::default();
        assert!(!requires_chunking(&inputs_spanning(60), &chunking));
        assert!(requires_chunking(&inputs_spanning(61), &chunking));
    }

    #[test]
    fn test_remote_needs_opt_in_and_enablement() {
        let mut config = InsightsConfig::for_test();
        let inputs = inputs_spanning(120);
        assert_eq!(
            select_strategy(&inputs, &SubmitOptions::default(), &config),
            AnalysisStrategy::Worker
        );
        assert_eq!(
            select_strategy(&inputs, &SubmitOptions::remote(), &config),
            AnalysisStrategy::RemoteChunked
        );
        assert_eq!(
            select_strategy(&inputs_spanning(10), &SubmitOptions::remote(), &config),
            AnalysisStrategy::RemoteSinglePass
        );
        config.remote.enabled = false;
        assert_eq!(
            select_strategy(&inputs, &SubmitOptions::remote(), &config),
            AnalysisStrategy::Worker
        );
    }
}
