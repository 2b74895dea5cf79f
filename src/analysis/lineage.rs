//! Data lineage: which record types a report was computed from.

use crate::constants::LINEAGE_SOURCE;
use crate::models::{AnalysisInputs, DataLineageItem, RecordType};

/// One entry per record type present in `inputs`, covering the analysed range
pub fn build_lineage(inputs: &AnalysisInputs) -> Vec<DataLineageItem> {
    let range = inputs.effective_range();
    let item = |record_type: RecordType, fields: &[&str]| DataLineageItem {
        source: LINEAGE_SOURCE.to_string(),
        record_type,
        time_range: range,
        fields: fields.iter().map(|f| f.to_string()).collect(),
    };

    let mut lineage = Vec::with_capacity(4);
    if !inputs.entries.is_empty() {
        lineage.push(item(RecordType::Tracking, &["timestamp", "environment", "notes"]));
    }
    let has_emotions =
        !inputs.emotions.is_empty() || inputs.entries.iter().any(|e| !e.emotions.is_empty());
    if has_emotions {
        lineage.push(item(RecordType::Emotion, &["emotion", "intensity", "triggers"]));
    }
    let has_sensory = !inputs.sensory_inputs.is_empty()
        || inputs.entries.iter().any(|e| !e.sensory_inputs.is_empty());
    if has_sensory {
        lineage.push(item(RecordType::Sensor, &["sensoryType", "response", "intensity"]));
    }
    if !inputs.goals.is_empty() {
        lineage.push(item(RecordType::Goal, &["title", "category"]));
    }
    lineage
}

/// Merge per-window lineage into one entry per record type, widening each
/// entry's time range to cover every window it appeared in
pub fn merge_lineage<I>(items: I) -> Vec<DataLineageItem>
where
    I: IntoIterator<Item = DataLineageItem>,
{
    let mut merged: Vec<DataLineageItem> = Vec::new();
    for item in items {
        match merged.iter_mut().find(|m| m.record_type == item.record_type) {
            Some(existing) => {
                existing.time_range = match (existing.time_range, item.time_range) {
                    (Some(a), Some(b)) => Some(crate::models::TimeRange::new(
                        a.start.min(b.start),
                        a.end.max(b.end),
                    )),
                    (a, b) => a.or(b),
                };
                for field in item.fields {
                    if !existing.fields.contains(&field) {
                        existing.fields.push(field);
                    }
                }
            }
            None => merged.push(item),
        }
    }
    merged.sort_by_key(|item| item.record_type);
    merged
}
