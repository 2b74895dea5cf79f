//! Cache tag derivation.
//!
//! Tags let one invalidation call purge everything related to a student or
//! goal without enumerating keys.

use crate::constants::tags;
use crate::models::AnalysisInputs;
use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeSet;

/// Tags for a report computed from `inputs`: the global tag, one per
/// referenced student and goal, the write month, the task tag and the
/// schema version.
pub fn derive_tags(inputs: &AnalysisInputs, schema_version: u32, now: DateTime<Utc>) -> BTreeSet<String> {
    let mut derived = BTreeSet::new();
    derived.insert(tags::GLOBAL.to_string());
    derived.extend(
        inputs
            .referenced_students()
            .into_iter()
            .map(student_tag),
    );
    derived.extend(
        inputs
            .goals
            .iter()
            .filter(|goal| !goal.id.trim().is_empty())
            .map(|goal| format!("{}{}", tags::GOAL_PREFIX, goal.id)),
    );
    derived.insert(month_tag(now));
    derived.insert(tags::INSIGHTS.to_string());
    derived.insert(format!("v{schema_version}"));
    derived
}

pub fn student_tag(student_id: &str) -> String {
    format!("{}{}", tags::STUDENT_PREFIX, student_id)
}

/// `analytics-<YYYY>-<M>`, month not zero-padded
pub fn month_tag(at: DateTime<Utc>) -> String {
    format!("{}-{}-{}", tags::GLOBAL, at.year(), at.month())
}
