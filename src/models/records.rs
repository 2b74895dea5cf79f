//! Source records supplied by the caller.
//!
//! The orchestrator only reads these; their persistence format belongs to the
//! host application.

use crate::error::{InsightsError, InsightsResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionEntry {
    pub id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
    pub emotion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(default)]
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensoryEntry {
    pub id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
    pub sensory_type: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
}

/// One tracking session, grouping the observations made during it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEntry {
    pub id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub emotions: Vec<EmotionEntry>,
    #[serde(default)]
    pub sensory_inputs: Vec<SensoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub student_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Anything with an observation time
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for EmotionEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for SensoryEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for TrackingEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Closed time interval requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whole days covered, rounded, never less than one
    pub fn span_days(&self) -> i64 {
        let millis = (self.end - self.start).num_milliseconds().max(0) as f64;
        let days = (millis / ChronoDuration::days(1).num_milliseconds() as f64).round() as i64;
        days.max(1)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Everything one analysis request is computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInputs {
    pub student_id: String,
    #[serde(default)]
    pub entries: Vec<TrackingEntry>,
    #[serde(default)]
    pub emotions: Vec<EmotionEntry>,
    #[serde(default)]
    pub sensory_inputs: Vec<SensoryEntry>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl AnalysisInputs {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            entries: Vec::new(),
            emotions: Vec::new(),
            sensory_inputs: Vec::new(),
            goals: Vec::new(),
            time_range: None,
        }
    }

    /// Reject requests that can never produce a meaningful result
    pub fn validate(&self) -> InsightsResult<()> {
        if self.student_id.trim().is_empty() {
            return Err(InsightsError::InvalidInput(
                "student_id is required".to_string(),
            ));
        }
        if let Some(range) = &self.time_range {
            if range.end < range.start {
                return Err(InsightsError::InvalidInput(format!(
                    "time range ends before it starts ({} < {})",
                    range.end.to_rfc3339(),
                    range.start.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    /// Count of timestamped records across all collections
    pub fn record_count(&self) -> usize {
        self.entries.len() + self.emotions.len() + self.sensory_inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.entries
            .iter()
            .map(Timestamped::timestamp)
            .chain(self.emotions.iter().map(Timestamped::timestamp))
            .chain(self.sensory_inputs.iter().map(Timestamped::timestamp))
    }

    /// Most recent observation across all collections
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps().max()
    }

    /// The explicit range if given, otherwise the span of the data itself
    pub fn effective_range(&self) -> Option<TimeRange> {
        if let Some(range) = self.time_range {
            return Some(range);
        }
        let start = self.timestamps().min()?;
        let end = self.timestamps().max()?;
        Some(TimeRange::new(start, end))
    }

    /// Student ids referenced by the request and its records, deduplicated
    pub fn referenced_students(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = std::iter::once(self.student_id.as_str())
            .chain(self.entries.iter().map(|e| e.student_id.as_str()))
            .chain(self.emotions.iter().map(|e| e.student_id.as_str()))
            .chain(self.sensory_inputs.iter().map(|e| e.student_id.as_str()))
            .filter(|id| !id.trim().is_empty())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    fn emotion(id: &str, day: u32) -> EmotionEntry {
        EmotionEntry {
            id: id.to_string(),
            student_id: "s1".to_string(),
            timestamp: at(day),
            emotion: "calm".to_string(),
            intensity: Some(3.0),
            triggers: vec![],
        }
    }

    #[test]
    fn test_missing_student_is_invalid_input() {
        let inputs = AnalysisInputs::new("  ");
        assert!(matches!(
            inputs.validate(),
            Err(InsightsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_inverted_range_is_invalid_input() {
        let mut inputs = AnalysisInputs::new("s1");
        inputs.time_range = Some(TimeRange::new(at(10), at(2)));
        assert!(inputs.validate().is_err());
    }

    #[test]
    fn test_effective_range_falls_back_to_data_span() {
        let mut inputs = AnalysisInputs::new("s1");
        assert!(inputs.effective_range().is_none());
        inputs.emotions = vec![emotion("a", 5), emotion("b", 2), emotion("c", 9)];
        let range = inputs.effective_range().unwrap();
        assert_eq!(range.start, at(2));
        assert_eq!(range.end, at(9));
        assert_eq!(range.span_days(), 7);
        assert_eq!(inputs.latest_timestamp(), Some(at(9)));
    }

    #[test]
    fn test_span_days_is_at_least_one() {
        assert_eq!(TimeRange::new(at(3), at(3)).span_days(), 1);
    }
}
