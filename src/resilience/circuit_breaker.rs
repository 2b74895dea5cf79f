//! # Worker Circuit Breaker
//!
//! Two-state breaker guarding the background execution context. `Closed`
//! allows dispatch; `Open` forbids it until a cause-dependent cooldown elapses,
//! after which the breaker reads as `Closed` again on its own. There is no
//! half-open probe: the next dispatch simply tries again and may re-trip.

use super::config::{CooldownPolicy, OpenReason};
use super::metrics::CircuitBreakerMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - dispatch to the background context is allowed
    Closed,
    /// Cooling down - every request is redirected to the fallback engine
    Open,
}

#[derive(Debug)]
struct BreakerState {
    open_until: Option<Instant>,
    policy: CooldownPolicy,
    metrics: CircuitBreakerMetrics,
}

impl BreakerState {
    /// Clear an elapsed window so the transition back to closed is logged once
    fn refresh(&mut self, name: &str, now: Instant) -> CircuitState {
        match self.open_until {
            Some(until) if now < until => CircuitState::Open,
            Some(_) => {
                self.open_until = None;
                info!(component = %name, "🟢 Circuit breaker closed (cooldown elapsed)");
                CircuitState::Closed
            }
            None => CircuitState::Closed,
        }
    }
}

#[derive(Debug)]
pub struct WorkerCircuitBreaker {
    /// Component name for logging and metrics
    name: String,
    state: Mutex<BreakerState>,
}

impl WorkerCircuitBreaker {
    pub fn new(name: impl Into<String>, policy: CooldownPolicy) -> Self {
        let name = name.into();
        info!(
            component = %name,
            runtime_error_cooldown_ms = policy.runtime_error.as_millis() as u64,
            init_failure_cooldown_ms = policy.init_failure.as_millis() as u64,
            timeout_cooldown_ms = policy.timeout.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );
        Self {
            name,
            state: Mutex::new(BreakerState {
                open_until: None,
                policy,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.state.lock().refresh(&self.name, Instant::now())
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Check whether a dispatch may proceed, counting the refusal if not
    pub fn allows_dispatch(&self) -> bool {
        let mut state = self.state.lock();
        match state.refresh(&self.name, Instant::now()) {
            CircuitState::Closed => true,
            CircuitState::Open => {
                state.metrics.rejected_dispatches += 1;
                false
            }
        }
    }

    /// Open the circuit for the cooldown that belongs to `reason`.
    ///
    /// Tripping an already open circuit extends the window only if the new
    /// deadline is later than the current one.
    pub fn trip(&self, reason: OpenReason) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let cooldown = state.policy.cooldown_for(reason);
        let until = now + cooldown;
        state.open_until = Some(match state.open_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
        state.metrics.record_trip(reason);

        warn!(
            component = %self.name,
            reason = %reason,
            cooldown_ms = cooldown.as_millis() as u64,
            "🔴 Circuit breaker opened"
        );
    }

    /// Time left before the circuit closes again
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let now = Instant::now();
        self.state
            .lock()
            .open_until
            .and_then(|until| until.checked_duration_since(now))
            .filter(|d| !d.is_zero())
    }

    /// Close immediately (administrative override)
    pub fn force_closed(&self) {
        let mut state = self.state.lock();
        if state.open_until.take().is_some() {
            info!(component = %self.name, "🔧 Circuit breaker force-closed");
        }
    }

    /// Swap the cooldown policy; an open window keeps its current deadline
    pub fn update_policy(&self, policy: CooldownPolicy) {
        self.state.lock().policy = policy;
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut state = self.state.lock();
        let now = Instant::now();
        let current = state.refresh(&self.name, now);
        let mut metrics = state.metrics.clone();
        metrics.current_state = current;
        metrics.remaining_cooldown = state
            .open_until
            .and_then(|until| until.checked_duration_since(now));
        metrics
    }
}
