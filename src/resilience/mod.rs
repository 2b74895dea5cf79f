//! # Resilience Module
//!
//! Fault isolation for the background execution context: a cooldown-based
//! circuit breaker, its metrics, and rate-limited user notifications.

pub mod circuit_breaker;
pub mod config;
pub mod metrics;
pub mod notifier;

pub use circuit_breaker::{CircuitState, WorkerCircuitBreaker};
pub use config::{CooldownPolicy, OpenReason};
pub use metrics::CircuitBreakerMetrics;
pub use notifier::{
    Notification, NotificationKind, Notifier, RateLimitedNotifier, RateLimiter, TracingNotifier,
};
