//! Window sizing and partitioning for the chunked pipeline.

use crate::config::ChunkingConfig;
use crate::models::{AnalysisInputs, ChunkContext, TimeRange, Timestamped};
use chrono::{DateTime, Duration, Utc};

/// Window size in days, from the first step whose `max_days` covers the span
pub fn choose_chunk_span_days(total_days: i64, chunking: &ChunkingConfig) -> i64 {
    chunking
        .span_steps
        .iter()
        .find(|step| total_days <= i64::from(step.max_days))
        .map_or(i64::from(chunking.default_span_days), |step| {
            i64::from(step.span_days)
        })
        .max(1)
}

/// Split `range` into consecutive windows of `span_days`, the last one
/// clipped to `range.end`. Windows are `[start, end)` except the final one,
/// which also includes `end`. Every window is returned, empty ones included.
pub fn partition(inputs: &AnalysisInputs, range: TimeRange, span_days: i64) -> Vec<ChunkContext> {
    let span = Duration::days(span_days.max(1));
    let mut windows = Vec::new();
    let mut cursor = range.start;

    loop {
        let window_end = (cursor + span).min(range.end);
        let last = window_end >= range.end;
        let in_window = |at: DateTime<Utc>| at >= cursor && (at < window_end || (last && at == window_end));

        windows.push(ChunkContext {
            index: windows.len(),
            range: TimeRange::new(cursor, window_end),
            entries: select(&inputs.entries, in_window),
            emotions: select(&inputs.emotions, in_window),
            sensory_inputs: select(&inputs.sensory_inputs, in_window),
        });

        if last {
            break;
        }
        cursor = window_end;
    }
    windows
}

fn select<T, F>(records: &[T], in_window: F) -> Vec<T>
where
    T: Timestamped + Clone,
    F: Fn(DateTime<Utc>) -> bool,
{
    records
        .iter()
        .filter(|record| in_window(record.timestamp()))
        .cloned()
        .collect()
}
