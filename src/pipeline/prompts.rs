//! Prompt construction for remote summarization and reduction.
//!
//! Every prompt carries a bounded, most-recent-first sample of each
//! collection so a single call stays within its size budget.

use crate::models::{
    AnalysisInputs, ChunkContext, ChunkSummary, EmotionEntry, Goal, SensoryEntry, TimeRange,
    Timestamped, TrackingEntry,
};
use crate::remote::Prompt;

const SYSTEM_PROMPT: &str =
    "You are an educational analytics assistant. Respond ONLY with valid JSON, without code fences. Do not include personal identifiers.";

const REPORT_FIELDS: &str = "{ summary?, keyFindings[], patterns[], correlations[], anomalies[], predictiveInsights[], suggestedInterventions[], insights[], confidence{} }";

const SUMMARY_FIELDS: &str =
    "keyFindings[], patterns[], correlations[], anomalies[], suggestedInterventions[], predictiveInsights[]";

/// Up to `limit` records, newest first
pub fn most_recent<T: Timestamped>(records: &[T], limit: usize) -> Vec<&T> {
    let mut sorted: Vec<&T> = records.iter().collect();
    sorted.sort_by_key(|record| std::cmp::Reverse(record.timestamp()));
    sorted.truncate(limit);
    sorted
}

/// Truncate on a character boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

fn format_range(range: &TimeRange) -> String {
    format!(
        "{} to {}",
        range.start.format("%Y-%m-%dT%H:%M:%S"),
        range.end.format("%Y-%m-%dT%H:%M:%S")
    )
}

fn format_intensity(intensity: Option<f64>) -> String {
    intensity.map(|i| format!("({i})")).unwrap_or_default()
}

fn tracking_line(entry: &TrackingEntry) -> String {
    let emotions: Vec<String> = entry
        .emotions
        .iter()
        .map(|e| format!("{}{}", e.emotion, format_intensity(e.intensity)))
        .collect();
    let sensory: Vec<String> = entry
        .sensory_inputs
        .iter()
        .map(|s| format!("{}{}", s.response, format_intensity(s.intensity)))
        .collect();
    let mut line = format!(
        "- {} | emotions: [{}] | sensory: [{}]",
        entry.timestamp.format("%Y-%m-%dT%H:%M:%S"),
        emotions.join(", "),
        sensory.join(", ")
    );
    if let Some(environment) = &entry.environment {
        line.push_str(&format!(" | environment: {environment}"));
    }
    if let Some(notes) = &entry.notes {
        line.push_str(&format!(" | notes: {notes}"));
    }
    line
}

fn emotion_line(entry: &EmotionEntry) -> String {
    let mut line = format!(
        "- {} | {}{}",
        entry.timestamp.format("%Y-%m-%dT%H:%M:%S"),
        entry.emotion,
        format_intensity(entry.intensity)
    );
    if !entry.triggers.is_empty() {
        line.push_str(&format!(" | triggers: {}", entry.triggers.join(", ")));
    }
    line
}

fn sensory_line(entry: &SensoryEntry) -> String {
    format!(
        "- {} | {} {}{}",
        entry.timestamp.format("%Y-%m-%dT%H:%M:%S"),
        entry.sensory_type,
        entry.response,
        format_intensity(entry.intensity)
    )
}

fn snapshot(
    entries: &[TrackingEntry],
    emotions: &[EmotionEntry],
    sensory: &[SensoryEntry],
    sample: usize,
) -> String {
    let mut lines = vec![format!("Sessions (up to {sample}, newest first):")];
    lines.extend(most_recent(entries, sample).into_iter().map(tracking_line));
    lines.push(format!("Emotions (up to {sample}, newest first):"));
    lines.extend(most_recent(emotions, sample).into_iter().map(emotion_line));
    lines.push(format!("Sensory inputs (up to {sample}, newest first):"));
    lines.extend(most_recent(sensory, sample).into_iter().map(sensory_line));
    lines.join("\n")
}

fn goals_line(goals: &[Goal]) -> String {
    let titles: Vec<&str> = goals.iter().map(|g| g.title.as_str()).collect();
    format!("Active goals: [{}]", titles.join(", "))
}

/// Summarize one window into a compact partial result
pub fn chunk_prompt(chunk: &ChunkContext, goals: &[Goal], sample: usize) -> Prompt {
    let user = [
        "Summarize this period briefly as JSON.".to_string(),
        format!("Period: {}", format_range(&chunk.range)),
        format!(
            "Counts: entries={}, emotions={}, sensory={}, goals={}",
            chunk.entries.len(),
            chunk.emotions.len(),
            chunk.sensory_inputs.len(),
            goals.len()
        ),
        goals_line(goals),
        String::new(),
        snapshot(&chunk.entries, &chunk.emotions, &chunk.sensory_inputs, sample),
        String::new(),
        format!("Return ONLY valid JSON with the fields: {SUMMARY_FIELDS}."),
        "Be concise and concrete. All strengths and probabilities within [0,1].".to_string(),
    ]
    .join("\n");
    Prompt::new(SYSTEM_PROMPT, user)
}

/// Merge window summaries, in chronological order, into one report
pub fn reduce_prompt(
    summaries: &[ChunkSummary],
    range: &TimeRange,
    max_payload_chars: usize,
) -> Result<Prompt, serde_json::Error> {
    let payload = serde_json::to_string(summaries)?;
    let user = [
        "You receive partial summaries (JSON) from consecutive periods for the same student.".to_string(),
        format!("Merge them into ONE coherent analysis using this JSON schema: {REPORT_FIELDS}"),
        "Be conservative and remove duplicates. Emphasize patterns that recur across several periods over one-off observations.".to_string(),
        format!("Analysis period: {}.", format_range(range)),
        "Partial summaries (JSON):".to_string(),
        truncate_chars(&payload, max_payload_chars),
    ]
    .join("\n");
    Ok(Prompt::new(SYSTEM_PROMPT, user))
}

/// Analyse a whole request in one call
pub fn single_pass_prompt(inputs: &AnalysisInputs, sample: usize) -> Prompt {
    let period = inputs
        .effective_range()
        .map_or_else(|| "unknown".to_string(), |range| format_range(&range));
    let user = [
        "Analyse the following observations for one student.".to_string(),
        format!("Period: {period}"),
        format!(
            "Counts: entries={}, emotions={}, sensory={}, goals={}",
            inputs.entries.len(),
            inputs.emotions.len(),
            inputs.sensory_inputs.len(),
            inputs.goals.len()
        ),
        goals_line(&inputs.goals),
        String::new(),
        snapshot(&inputs.entries, &inputs.emotions, &inputs.sensory_inputs, sample),
        String::new(),
        format!("Return ONLY valid JSON using this schema: {REPORT_FIELDS}"),
    ]
    .join("\n");
    Prompt::new(SYSTEM_PROMPT, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn emotion(day: i64, label: &str) -> EmotionEntry {
        EmotionEntry {
            id: format!("e{day}"),
            student_id: "s1".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            emotion: label.into(),
            intensity: Some(3.0),
            triggers: vec![],
        }
    }

    #[test]
    fn test_sample_is_most_recent_first() {
        let records: Vec<_> = (0..20).map(|d| emotion(d, "calm")).collect();
        let sample = most_recent(&records, 8);
        assert_eq!(sample.len(), 8);
        assert_eq!(sample[0].id, "e19");
        assert_eq!(sample[7].id, "e12");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("æøå-abc", 3), "æøå");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_reduce_payload_is_capped() {
        let summaries: Vec<ChunkSummary> = (0..50)
            .map(|i| ChunkSummary {
                key_findings: vec![format!("finding number {i} with some padding text")],
                ..ChunkSummary::default()
            })
            .collect();
        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        );
        let full = reduce_prompt(&summaries, &range, usize::MAX).unwrap();
        let capped = reduce_prompt(&summaries, &range, 100).unwrap();
        assert!(capped.user.len() < full.user.len());
        assert!(full.user.contains("recur across several periods"));
    }

    #[test]
    fn test_single_pass_prompt_lists_samples() {
        let mut inputs = AnalysisInputs::new("s1");
        inputs.emotions = vec![emotion(0, "calm"), emotion(1, "anxious")];
        let prompt = single_pass_prompt(&inputs, 8);
        assert!(prompt.user.contains("anxious(3)"));
        assert!(prompt.user.contains("emotions=2"));
        assert!(prompt.system.contains("valid JSON"));
    }
}
