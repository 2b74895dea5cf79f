//! The normalized analysis report every compute path produces.

use super::records::TimeRange;
use crate::constants::caveats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Within `[0, 1]`
    #[serde(default)]
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<Severity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub variables: (String, String),
    /// Within `[-1, 1]`
    pub coefficient: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveInsight {
    pub outcome: String,
    /// Within `[0, 1]`
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Tracking,
    Emotion,
    Sensor,
    Goal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLineageItem {
    pub source: String,
    pub record_type: RecordType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confidence {
    /// Within `[0, 1]`
    pub overall: f64,
    #[serde(default)]
    pub calibration: String,
}

impl Default for Confidence {
    fn default() -> Self {
        Self {
            overall: 0.0,
            calibration: String::new(),
        }
    }
}

/// Which compute path produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportOrigin {
    Worker,
    #[default]
    Fallback,
    RemoteSinglePass,
    RemoteChunked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub key_findings: Vec<String>,
    pub patterns: Vec<Pattern>,
    pub correlations: Vec<Correlation>,
    pub anomalies: Vec<Anomaly>,
    pub predictive_insights: Vec<PredictiveInsight>,
    pub suggested_interventions: Vec<Intervention>,
    pub insights: Vec<String>,
    pub data_lineage: Vec<DataLineageItem>,
    pub confidence: Confidence,
    pub caveats: Vec<String>,
    pub origin: ReportOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl AnalysisReport {
    /// Minimal valid report used when even the fallback path cannot compute
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            insights: vec![caveats::ANALYTICS_UNAVAILABLE.to_string()],
            caveats: vec![reason.into()],
            confidence: Confidence {
                overall: 0.0,
                calibration: "fallback=unavailable".to_string(),
            },
            ..Self::default()
        }
    }

    /// Append a caveat unless an identical one is already present
    pub fn add_caveat(&mut self, caveat: impl Into<String>) {
        let caveat = caveat.into();
        if !self.caveats.iter().any(|c| *c == caveat) {
            self.caveats.push(caveat);
        }
    }

    pub fn with_caveat(mut self, caveat: impl Into<String>) -> Self {
        self.add_caveat(caveat);
        self
    }

    pub fn has_caveat(&self, caveat: &str) -> bool {
        self.caveats.iter().any(|c| c == caveat)
    }

    /// Bring the report into its canonical shape: numbers clamped into their
    /// ranges, caveats and lineage deduplicated.
    pub fn normalized(mut self) -> Self {
        for pattern in &mut self.patterns {
            pattern.strength = clamp_unit(pattern.strength);
        }
        for correlation in &mut self.correlations {
            correlation.coefficient = clamp_signed_unit(correlation.coefficient);
        }
        for insight in &mut self.predictive_insights {
            insight.probability = clamp_unit(insight.probability);
        }
        self.confidence.overall = clamp_unit(self.confidence.overall);

        let mut seen_caveats = Vec::with_capacity(self.caveats.len());
        self.caveats.retain(|c| {
            if seen_caveats.contains(c) {
                false
            } else {
                seen_caveats.push(c.clone());
                true
            }
        });

        let mut seen_types = Vec::with_capacity(self.data_lineage.len());
        self.data_lineage.retain(|item| {
            if seen_types.contains(&item.record_type) {
                false
            } else {
                seen_types.push(item.record_type);
                true
            }
        });
        self
    }

    /// Whether every numeric field already lies within its documented range
    pub fn is_within_bounds(&self) -> bool {
        let unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        self.patterns.iter().all(|p| unit(p.strength))
            && self
                .correlations
                .iter()
                .all(|c| c.coefficient.is_finite() && (-1.0..=1.0).contains(&c.coefficient))
            && self.predictive_insights.iter().all(|p| unit(p.probability))
            && unit(self.confidence.overall)
    }
}

/// Clamp into `[0, 1]`, mapping non-finite values to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Clamp into `[-1, 1]`, mapping non-finite values to 0
pub fn clamp_signed_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_report_shape() {
        let report = AnalysisReport::unavailable("fallback engine failed");
        assert_eq!(report.insights, vec!["Analytics temporarily unavailable."]);
        assert!(report.has_caveat("fallback engine failed"));
        assert_eq!(report.confidence.overall, 0.0);
    }

    #[test]
    fn test_normalized_clamps_and_dedupes() {
        let report = AnalysisReport {
            patterns: vec![Pattern {
                name: "p".into(),
                description: None,
                strength: 1.7,
                impact: None,
            }],
            correlations: vec![Correlation {
                variables: ("a".into(), "b".into()),
                coefficient: -3.0,
                description: None,
            }],
            confidence: Confidence {
                overall: f64::NAN,
                calibration: String::new(),
            },
            caveats: vec!["x".into(), "x".into(), "y".into()],
            ..AnalysisReport::default()
        }
        .normalized();

        assert_eq!(report.patterns[0].strength, 1.0);
        assert_eq!(report.correlations[0].coefficient, -1.0);
        assert_eq!(report.confidence.overall, 0.0);
        assert_eq!(report.caveats, vec!["x".to_string(), "y".to_string()]);
        assert!(report.is_within_bounds());
    }

    #[test]
    fn test_deserializes_with_missing_arrays() {
        let report: AnalysisReport = serde_json::from_value(serde_json::json!({
            "keyFindings": ["one"],
        }))
        .unwrap();
        assert_eq!(report.key_findings, vec!["one"]);
        assert!(report.patterns.is_empty());
        assert_eq!(report.origin, ReportOrigin::Fallback);
    }
}
