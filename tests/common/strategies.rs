//! Proptest strategies for datasets and cache operations.

use chrono::{Duration, TimeZone, Utc};
use insights_core::models::{AnalysisInputs, EmotionEntry, Goal};
use proptest::prelude::*;

pub fn emotion_label_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["calm", "anxious", "happy", "frustrated", "tired"]).prop_map(String::from)
}

pub fn emotion_strategy() -> impl Strategy<Value = EmotionEntry> {
    (0u32..10_000, 0i64..365, emotion_label_strategy(), prop::option::of(1u8..=5)).prop_map(
        |(id, day, emotion, intensity)| EmotionEntry {
            id: format!("e{id}"),
            student_id: "student-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            emotion,
            intensity: intensity.map(f64::from),
            triggers: vec![],
        },
    )
}

pub fn goal_strategy() -> impl Strategy<Value = Goal> {
    (0u32..1_000, "[a-z ]{3,20}").prop_map(|(id, title)| Goal {
        id: format!("g{id}"),
        student_id: "student-1".to_string(),
        title,
        category: None,
    })
}

pub fn dataset_strategy() -> impl Strategy<Value = AnalysisInputs> {
    (
        prop::collection::vec(emotion_strategy(), 0..20),
        prop::collection::vec(goal_strategy(), 0..4),
    )
        .prop_map(|(emotions, goals)| {
            let mut inputs = AnalysisInputs::new("student-1");
            inputs.emotions = emotions;
            inputs.goals = goals;
            inputs
        })
}

/// Operations applied to a cache in the capacity property
#[derive(Debug, Clone)]
pub enum CacheOp {
    Set(u8),
    Get(u8),
}

pub fn cache_ops_strategy() -> impl Strategy<Value = Vec<CacheOp>> {
    prop::collection::vec(
        prop_oneof![
            (0u8..32).prop_map(CacheOp::Set),
            (0u8..32).prop_map(CacheOp::Get),
        ],
        1..200,
    )
}
