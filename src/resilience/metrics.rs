//! # Circuit Breaker Metrics
//!
//! Trip and rejection counters for the worker circuit breaker.

use super::config::OpenReason;
use super::CircuitState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Total number of Closed → Open transitions (re-trips while open included)
    pub total_trips: u64,

    pub runtime_error_trips: u64,

    pub init_failure_trips: u64,

    pub timeout_trips: u64,

    /// Dispatch attempts refused while open
    pub rejected_dispatches: u64,

    /// Current circuit breaker state
    pub current_state: CircuitState,

    /// Cause of the most recent trip
    pub last_reason: Option<OpenReason>,

    /// Time left in the open window, if open
    pub remaining_cooldown: Option<Duration>,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_trips: 0,
            runtime_error_trips: 0,
            init_failure_trips: 0,
            timeout_trips: 0,
            rejected_dispatches: 0,
            current_state: CircuitState::Closed,
            last_reason: None,
            remaining_cooldown: None,
        }
    }

    pub(crate) fn record_trip(&mut self, reason: OpenReason) {
        self.total_trips += 1;
        self.last_reason = Some(reason);
        match reason {
            OpenReason::RuntimeError => self.runtime_error_trips += 1,
            OpenReason::InitFailure => self.init_failure_trips += 1,
            OpenReason::Timeout => self.timeout_trips += 1,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Background dispatch allowed",
            CircuitState::Open => "Cooling down - Requests served by fallback",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Trips: {} (runtime {}, init {}, timeout {}) | Rejected: {}",
            self.state_description(),
            self.total_trips,
            self.runtime_error_trips,
            self.init_failure_trips,
            self.timeout_trips,
            self.rejected_dispatches
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
