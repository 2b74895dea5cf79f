//! Compute tasks handed from the orchestrator to a compute path.

use super::records::AnalysisInputs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "Insights/Compute")]
    InsightsCompute,
}

/// Per-request submission options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOptions {
    /// Route through the remote model (single pass or chunked)
    pub use_remote_model: bool,
    /// Populate the cache only; never touch caller-visible state
    pub is_prewarm: bool,
    /// Skip the cache lookup (the result is still written)
    pub bypass_cache: bool,
    pub ttl_override: Option<Duration>,
}

impl SubmitOptions {
    pub fn remote() -> Self {
        Self {
            use_remote_model: true,
            ..Self::default()
        }
    }

    pub fn prewarm() -> Self {
        Self {
            is_prewarm: true,
            ..Self::default()
        }
    }
}

/// A unit of work bound to a cache key. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeTask {
    kind: TaskKind,
    inputs: AnalysisInputs,
    cache_key: String,
    ttl: Duration,
    tags: BTreeSet<String>,
    is_prewarm: bool,
}

impl ComputeTask {
    pub fn new(
        inputs: AnalysisInputs,
        cache_key: impl Into<String>,
        ttl: Duration,
        tags: BTreeSet<String>,
        is_prewarm: bool,
    ) -> Self {
        Self {
            kind: TaskKind::InsightsCompute,
            inputs,
            cache_key: cache_key.into(),
            ttl,
            tags,
            is_prewarm,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn inputs(&self) -> &AnalysisInputs {
        &self.inputs
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn is_prewarm(&self) -> bool {
        self.is_prewarm
    }
}
