//! # System Constants
//!
//! Tag names, caveat strings and hard bounds shared across the orchestrator,
//! the worker supervisor and the analysis pipelines.

use std::time::Duration;

/// Cache tags attached to every computed report
pub mod tags {
    /// Global namespace tag carried by every cached analytics entry
    pub const GLOBAL: &str = "analytics";
    /// Task-level tag identifying insight computations
    pub const INSIGHTS: &str = "insights";
    /// Wildcard accepted by tag invalidation to clear everything
    pub const WILDCARD: &str = "*";
    /// Prefix for per-student tags (`student-<id>`)
    pub const STUDENT_PREFIX: &str = "student-";
    /// Prefix for per-goal tags (`goal-<id>`)
    pub const GOAL_PREFIX: &str = "goal-";
}

/// Human-readable caveats attached to degraded reports
pub mod caveats {
    pub const WORKER_TIMEOUT_FALLBACK: &str =
        "Worker timeout - results computed using fallback mode.";
    pub const WORKER_UNAVAILABLE_FALLBACK: &str =
        "Background analysis unavailable - results computed using fallback mode.";
    pub const WORKER_ERROR_FALLBACK: &str =
        "Background analysis failed - results computed using fallback mode.";
    pub const WORKER_DISABLED_FALLBACK: &str =
        "Background analysis disabled - results computed using fallback mode.";
    pub const SCHEMA_REPAIRED: &str = "AI output failed schema validation; applied repair pass";
    pub const MAP_REDUCE: &str =
        "Long-horizon analysis: results combined from per-window summaries.";
    pub const REMOTE_FAILED_FALLBACK: &str =
        "AI analysis failed - results computed using local heuristics.";
    pub const INSUFFICIENT_DATA: &str =
        "Not enough data in the selected period for a long-horizon analysis.";
    pub const LIMITED_DATA: &str = "Limited data available; findings are preliminary.";
    pub const ANALYTICS_UNAVAILABLE: &str = "Analytics temporarily unavailable.";
}

/// Lower bound for the per-request watchdog
pub const WATCHDOG_MIN: Duration = Duration::from_millis(5_000);

/// Upper bound for the per-request watchdog
pub const WATCHDOG_MAX: Duration = Duration::from_millis(20_000);

/// Cache key namespace
pub const CACHE_KEY_NAMESPACE: &str = "insights";

/// Source label recorded in data lineage for locally stored records
pub const LINEAGE_SOURCE: &str = "local-storage";

/// Progress stage announced by a freshly started execution context
pub const READY_STAGE: &str = "ready";

/// Upper bound on items kept per list in a chunk summary
pub const MAX_SUMMARY_ITEMS: usize = 10;

/// Clamp a configured watchdog timeout into the supported window.
pub fn clamp_watchdog_timeout(configured: Duration) -> Duration {
    configured.clamp(WATCHDOG_MIN, WATCHDOG_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_clamp() {
        assert_eq!(clamp_watchdog_timeout(Duration::from_millis(1)), WATCHDOG_MIN);
        assert_eq!(clamp_watchdog_timeout(Duration::from_secs(60)), WATCHDOG_MAX);
        assert_eq!(
            clamp_watchdog_timeout(Duration::from_millis(15_000)),
            Duration::from_millis(15_000)
        );
    }
}
