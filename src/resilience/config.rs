//! # Cooldown Configuration
//!
//! Runtime form of the circuit breaker settings. Built from
//! [`crate::config::CircuitBreakerConfig`] via `to_resilience_config()`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why the worker circuit was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenReason {
    /// The execution context reported a crash
    RuntimeError,
    /// The execution context could not be created
    InitFailure,
    /// The watchdog fired for an in-flight request
    Timeout,
}

impl OpenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenReason::RuntimeError => "runtime_error",
            OpenReason::InitFailure => "init_failure",
            OpenReason::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for OpenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open-window length per trip cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownPolicy {
    pub runtime_error: Duration,
    pub init_failure: Duration,
    pub timeout: Duration,
}

impl CooldownPolicy {
    pub fn cooldown_for(&self, reason: OpenReason) -> Duration {
        match reason {
            OpenReason::RuntimeError => self.runtime_error,
            OpenReason::InitFailure => self.init_failure,
            OpenReason::Timeout => self.timeout,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        for reason in [OpenReason::RuntimeError, OpenReason::InitFailure, OpenReason::Timeout] {
            let cooldown = self.cooldown_for(reason);
            if cooldown.is_zero() {
                return Err(format!("{reason} cooldown must be greater than 0"));
            }
            if cooldown > Duration::from_secs(600) {
                return Err(format!("{reason} cooldown should not exceed 600 seconds"));
            }
        }

        if self.runtime_error < self.init_failure {
            return Err(
                "runtime_error cooldown should not be shorter than init_failure cooldown"
                    .to_string(),
            );
        }

        Ok(())
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        crate::config::CircuitBreakerConfig::default().to_resilience_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_favours_longer_crash_cooldown() {
        let policy = CooldownPolicy::default();
        assert!(policy.validate().is_ok());
        assert!(
            policy.cooldown_for(OpenReason::RuntimeError)
                > policy.cooldown_for(OpenReason::InitFailure)
        );
    }

    #[test]
    fn test_zero_cooldown_is_rejected() {
        let policy = CooldownPolicy {
            timeout: Duration::ZERO,
            ..CooldownPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
