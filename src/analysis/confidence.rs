//! Confidence scoring from data volume, recency and degradation flags.

use crate::config::ConfidenceConfig;
use crate::models::{AnalysisInputs, Confidence};
use chrono::{DateTime, Utc};

/// Degradations applied on the way to a report; each lowers confidence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DegradationFlags {
    pub repaired: bool,
    pub used_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct ConfidenceCalculator {
    settings: ConfidenceConfig,
}

impl ConfidenceCalculator {
    pub fn new(settings: ConfidenceConfig) -> Self {
        Self { settings }
    }

    pub fn compute(&self, inputs: &AnalysisInputs, flags: DegradationFlags, now: DateTime<Utc>) -> Confidence {
        let s = &self.settings;
        let emotions = inputs.emotions.len()
            + inputs.entries.iter().map(|e| e.emotions.len()).sum::<usize>();
        let sensory = inputs.sensory_inputs.len()
            + inputs
                .entries
                .iter()
                .map(|e| e.sensory_inputs.len())
                .sum::<usize>();
        let tracking = inputs.entries.len();

        let volume = ratio(emotions, s.emotion_threshold) * s.emotion_weight
            + ratio(sensory, s.sensory_threshold) * s.sensory_weight
            + ratio(tracking, s.tracking_threshold) * s.tracking_weight;

        let days_since_last = inputs
            .latest_timestamp()
            .map(|last| (now - last).num_days().max(0));
        let recency = match days_since_last {
            Some(days) if days <= s.days_since_last_threshold => s.recency_boost,
            _ => 0.0,
        };

        // Cap before penalties so every degradation is visible in the score
        let mut overall = (volume + recency).min(1.0);
        if flags.repaired {
            overall -= s.repair_penalty;
        }
        if flags.used_fallback {
            overall -= s.fallback_penalty;
        }

        let calibration = format!(
            "data:e={emotions},s={sensory},t={tracking}; daysSinceLast={}; validation={}; fallback={}",
            days_since_last.map_or_else(|| "n/a".to_string(), |d| d.to_string()),
            if flags.repaired { "repaired" } else { "ok" },
            if flags.used_fallback { "heuristic" } else { "none" },
        );

        Confidence {
            overall: overall.clamp(0.0, 1.0),
            calibration,
        }
    }
}

fn ratio(count: usize, threshold: usize) -> f64 {
    if threshold == 0 {
        return 1.0;
    }
    (count as f64 / threshold as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmotionEntry, SensoryEntry, TrackingEntry};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn rich_inputs() -> AnalysisInputs {
        let mut inputs = AnalysisInputs::new("s1");
        let at = now() - Duration::days(1);
        inputs.emotions = (0..10)
            .map(|i| EmotionEntry {
                id: format!("e{i}"),
                student_id: "s1".into(),
                timestamp: at,
                emotion: "calm".into(),
                intensity: None,
                triggers: vec![],
            })
            .collect();
        inputs.sensory_inputs = (0..10)
            .map(|i| SensoryEntry {
                id: format!("s{i}"),
                student_id: "s1".into(),
                timestamp: at,
                sensory_type: "auditory".into(),
                response: "seeking".into(),
                intensity: None,
            })
            .collect();
        inputs.entries = (0..5)
            .map(|i| TrackingEntry {
                id: format!("t{i}"),
                student_id: "s1".into(),
                timestamp: at,
                emotions: vec![],
                sensory_inputs: vec![],
                environment: None,
                notes: None,
            })
            .collect();
        inputs
    }

    #[test]
    fn test_full_data_saturates() {
        let calc = ConfidenceCalculator::new(ConfidenceConfig::default());
        let confidence = calc.compute(&rich_inputs(), DegradationFlags::default(), now());
        assert!((confidence.overall - 1.0).abs() < 1e-9);
        assert_eq!(
            confidence.calibration,
            "data:e=10,s=10,t=5; daysSinceLast=1; validation=ok; fallback=none"
        );
    }

    #[test]
    fn test_each_degradation_lowers_confidence() {
        let calc = ConfidenceCalculator::new(ConfidenceConfig::default());
        let inputs = rich_inputs();
        let clean = calc.compute(&inputs, DegradationFlags::default(), now()).overall;
        let repaired = calc
            .compute(&inputs, DegradationFlags { repaired: true, used_fallback: false }, now())
            .overall;
        let both = calc
            .compute(&inputs, DegradationFlags { repaired: true, used_fallback: true }, now())
            .overall;
        assert!(repaired < clean);
        assert!(both < repaired);
    }

    #[test]
    fn test_no_data_scores_zero() {
        let calc = ConfidenceCalculator::new(ConfidenceConfig::default());
        let confidence = calc.compute(&AnalysisInputs::new("s1"), DegradationFlags::default(), now());
        assert_eq!(confidence.overall, 0.0);
        assert!(confidence.calibration.contains("daysSinceLast=n/a"));
    }
}
