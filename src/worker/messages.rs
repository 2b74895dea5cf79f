//! Messages exchanged with the background execution context.
//!
//! The context shares no memory with the supervisor: work goes in as
//! [`WorkerCommand`]s, everything comes back as [`WorkerMessage`]s.

use crate::models::{AnalysisReport, ComputeTask};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// A task bound to the request that dispatched it
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub request_id: Uuid,
    pub task: Arc<ComputeTask>,
}

/// Supervisor → context
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Compute the task and answer with `Complete` or `Error`
    Compute(WorkerRequest),
    /// Stop after the current task
    Shutdown,
}

/// Context → supervisor
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Liveness and progress; `cache_key` is absent for context-level events
    Progress {
        cache_key: Option<String>,
        request_id: Option<Uuid>,
        stage: String,
        percent: u8,
    },
    /// Intermediate result; forwarded to progress subscribers, never cached
    Partial {
        cache_key: String,
        request_id: Uuid,
        payload: AnalysisReport,
    },
    /// Final result for one request
    Complete {
        cache_key: String,
        request_id: Uuid,
        report: AnalysisReport,
    },
    /// Runtime failure inside the context
    Error {
        cache_key: Option<String>,
        request_id: Option<Uuid>,
        message: String,
    },
}

impl WorkerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::Progress { .. } => "progress",
            WorkerMessage::Partial { .. } => "partial",
            WorkerMessage::Complete { .. } => "complete",
            WorkerMessage::Error { .. } => "error",
        }
    }

    pub fn cache_key(&self) -> Option<&str> {
        match self {
            WorkerMessage::Progress { cache_key, .. } | WorkerMessage::Error { cache_key, .. } => {
                cache_key.as_deref()
            }
            WorkerMessage::Partial { cache_key, .. } | WorkerMessage::Complete { cache_key, .. } => {
                Some(cache_key)
            }
        }
    }

    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            WorkerMessage::Progress { request_id, .. } | WorkerMessage::Error { request_id, .. } => {
                *request_id
            }
            WorkerMessage::Partial { request_id, .. } | WorkerMessage::Complete { request_id, .. } => {
                Some(*request_id)
            }
        }
    }
}

/// Event published on the supervisor's progress stream
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        cache_key: Option<String>,
        stage: String,
        percent: u8,
    },
    Partial {
        cache_key: String,
        report: AnalysisReport,
    },
}
