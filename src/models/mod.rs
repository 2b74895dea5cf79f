//! # Data Models
//!
//! Source records, compute tasks, chunk contexts and the normalized
//! [`AnalysisReport`] every compute path converges on.

pub mod chunk;
pub mod records;
pub mod report;
pub mod task;

pub use chunk::{ChunkContext, ChunkSummary};
pub use records::{
    AnalysisInputs, EmotionEntry, Goal, SensoryEntry, TimeRange, Timestamped, TrackingEntry,
};
pub use report::{
    clamp_signed_unit, clamp_unit, AnalysisReport, Anomaly, Confidence, Correlation, DataLineageItem, Intervention, Pattern,
    PredictiveInsight, RecordType, ReportOrigin, Severity,
};
pub use task::{ComputeTask, SubmitOptions, TaskKind};
