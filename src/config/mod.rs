//! # Insights Configuration
//!
//! Typed configuration for the orchestrator, loaded from layered TOML files and
//! `INSIGHTS__*` environment variables (see [`loader`]) and hot-swapped at
//! runtime through a [`ConfigProvider`].
//!
//! ```rust
//! use insights_core::config::InsightsConfig;
//!
//! let config = InsightsConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.cache.max_entries, 50);
//! ```

pub mod error;
pub mod loader;
pub mod provider;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::load_config;
pub use provider::{ConfigProvider, Subscription};

use crate::constants::clamp_watchdog_timeout;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InsightsConfig {
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub chunking: ChunkingConfig,
    pub remote: RemoteConfig,
    pub confidence: ConfidenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
    /// Entries written under another version are treated as absent
    pub schema_version: u32,
    pub invalidate_on_config_change: bool,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 600,
            max_entries: 50,
            schema_version: 2,
            invalidate_on_config_change: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// When false every request goes straight to the fallback engine
    pub enabled: bool,
    pub watchdog_timeout_ms: u64,
    /// Re-arm the watchdog on progress and partial messages
    pub heartbeat_rearm: bool,
    pub prewarm_stagger_ms: u64,
}

impl WorkerConfig {
    /// Configured watchdog timeout clamped into the supported window
    pub fn watchdog_timeout(&self) -> Duration {
        clamp_watchdog_timeout(Duration::from_millis(self.watchdog_timeout_ms))
    }

    pub fn prewarm_stagger(&self) -> Duration {
        Duration::from_millis(self.prewarm_stagger_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watchdog_timeout_ms: 15_000,
            heartbeat_rearm: true,
            prewarm_stagger_ms: 100,
        }
    }
}

/// Cooldown windows for the worker circuit breaker, per trip cause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub runtime_error_cooldown_ms: u64,
    pub init_failure_cooldown_ms: u64,
    pub timeout_cooldown_ms: u64,
    /// Minimum spacing between two user notifications of the same kind
    pub notification_window_ms: u64,
}

impl CircuitBreakerConfig {
    /// Convert to the resilience module's runtime representation
    pub fn to_resilience_config(&self) -> crate::resilience::CooldownPolicy {
        crate::resilience::CooldownPolicy {
            runtime_error: Duration::from_millis(self.runtime_error_cooldown_ms),
            init_failure: Duration::from_millis(self.init_failure_cooldown_ms),
            timeout: Duration::from_millis(self.timeout_cooldown_ms),
        }
    }

    pub fn notification_window(&self) -> Duration {
        Duration::from_millis(self.notification_window_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            runtime_error_cooldown_ms: 60_000,
            init_failure_cooldown_ms: 15_000,
            timeout_cooldown_ms: 30_000,
            notification_window_ms: 60_000,
        }
    }
}

/// One step of the span step function: ranges up to `max_days` use
/// windows of `span_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpanStep {
    pub max_days: u32,
    pub span_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Ranges longer than this many days go through map-reduce
    pub long_horizon_days: u32,
    /// Record counts above this go through map-reduce regardless of span
    pub max_records_single_pass: usize,
    /// Ascending by `max_days`
    pub span_steps: Vec<ChunkSpanStep>,
    pub default_span_days: u32,
    pub sample_per_collection: usize,
    pub chunk_timeout_ms: u64,
    pub reduce_timeout_ms: u64,
    pub max_concurrent_chunks: usize,
    pub max_reduce_payload_chars: usize,
}

impl ChunkingConfig {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    pub fn reduce_timeout(&self) -> Duration {
        Duration::from_millis(self.reduce_timeout_ms)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            long_horizon_days: 60,
            max_records_single_pass: 375,
            span_steps: vec![
                ChunkSpanStep { max_days: 30, span_days: 7 },
                ChunkSpanStep { max_days: 120, span_days: 14 },
                ChunkSpanStep { max_days: 365, span_days: 30 },
            ],
            default_span_days: 60,
            sample_per_collection: 8,
            chunk_timeout_ms: 30_000,
            reduce_timeout_ms: 60_000,
            max_concurrent_chunks: 1,
            max_reduce_payload_chars: 120_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub model_name: String,
    /// Records sampled per collection for a single-pass remote call
    pub single_pass_record_limit: usize,
    pub request_timeout_ms: u64,
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_name: "default".to_string(),
            single_pass_record_limit: 120,
            request_timeout_ms: 45_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub emotion_threshold: usize,
    pub sensory_threshold: usize,
    pub tracking_threshold: usize,
    pub days_since_last_threshold: i64,
    pub emotion_weight: f64,
    pub sensory_weight: f64,
    pub tracking_weight: f64,
    pub recency_boost: f64,
    pub repair_penalty: f64,
    pub fallback_penalty: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            emotion_threshold: 10,
            sensory_threshold: 10,
            tracking_threshold: 5,
            days_since_last_threshold: 7,
            emotion_weight: 0.3,
            sensory_weight: 0.3,
            tracking_weight: 0.4,
            recency_boost: 0.1,
            repair_penalty: 0.1,
            fallback_penalty: 0.2,
        }
    }
}

/// The part of the configuration that changes analysis output and therefore
/// participates in cache keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintConfig<'a> {
    pub schema_version: u32,
    pub long_horizon_days: u32,
    pub max_records_single_pass: usize,
    pub span_steps: &'a [ChunkSpanStep],
    pub default_span_days: u32,
    pub sample_per_collection: usize,
    pub confidence: &'a ConfidenceConfig,
    pub model_name: &'a str,
}

impl InsightsConfig {
    /// Profile with short windows suited to tests
    pub fn for_test() -> Self {
        Self {
            cache: CacheConfig {
                ttl_seconds: 60,
                max_entries: 16,
                ..CacheConfig::default()
            },
            worker: WorkerConfig {
                watchdog_timeout_ms: 5_000,
                prewarm_stagger_ms: 10,
                ..WorkerConfig::default()
            },
            circuit_breaker: CircuitBreakerConfig {
                runtime_error_cooldown_ms: 2_000,
                init_failure_cooldown_ms: 500,
                timeout_cooldown_ms: 1_000,
                notification_window_ms: 2_000,
            },
            chunking: ChunkingConfig {
                chunk_timeout_ms: 1_000,
                reduce_timeout_ms: 2_000,
                ..ChunkingConfig::default()
            },
            remote: RemoteConfig {
                enabled: true,
                model_name: "test-model".to_string(),
                ..RemoteConfig::default()
            },
            confidence: ConfidenceConfig::default(),
        }
    }

    /// Subset of the configuration that participates in cache keys
    pub fn fingerprint_subset(&self) -> FingerprintConfig<'_> {
        FingerprintConfig {
            schema_version: self.cache.schema_version,
            long_horizon_days: self.chunking.long_horizon_days,
            max_records_single_pass: self.chunking.max_records_single_pass,
            span_steps: &self.chunking.span_steps,
            default_span_days: self.chunking.default_span_days,
            sample_per_collection: self.chunking.sample_per_collection,
            confidence: &self.confidence,
            model_name: &self.remote.model_name,
        }
    }

    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_entries",
                "0",
                "cache must hold at least one entry",
            ));
        }

        if self.cache.ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.ttl_seconds",
                "0",
                "ttl must be greater than 0",
            ));
        }

        if self.chunking.span_steps.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "chunking.span_steps",
                "at least one span step must be configured",
            ));
        }

        let ascending = self
            .chunking
            .span_steps
            .windows(2)
            .all(|pair| pair[0].max_days < pair[1].max_days && pair[0].span_days <= pair[1].span_days);
        if !ascending {
            return Err(ConfigurationError::invalid_value(
                "chunking.span_steps",
                format!("{:?}", self.chunking.span_steps),
                "steps must be strictly ascending by max_days with non-decreasing spans",
            ));
        }

        if self
            .chunking
            .span_steps
            .iter()
            .any(|step| step.span_days == 0)
            || self.chunking.default_span_days == 0
        {
            return Err(ConfigurationError::invalid_value(
                "chunking.span_steps",
                "0",
                "window span must be at least one day",
            ));
        }

        if self.chunking.max_concurrent_chunks == 0 {
            return Err(ConfigurationError::invalid_value(
                "chunking.max_concurrent_chunks",
                "0",
                "at least one chunk call must be allowed",
            ));
        }

        if self.chunking.sample_per_collection == 0 {
            return Err(ConfigurationError::invalid_value(
                "chunking.sample_per_collection",
                "0",
                "sample size must be greater than 0",
            ));
        }

        if self.remote.enabled && self.remote.model_name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "remote.model_name",
                "remote configuration",
            ));
        }

        let c = &self.confidence;
        for (field, value) in [
            ("confidence.emotion_weight", c.emotion_weight),
            ("confidence.sensory_weight", c.sensory_weight),
            ("confidence.tracking_weight", c.tracking_weight),
            ("confidence.recency_boost", c.recency_boost),
            ("confidence.repair_penalty", c.repair_penalty),
            ("confidence.fallback_penalty", c.fallback_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value.to_string(),
                    "must be within [0, 1]",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = InsightsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl_seconds, 600);
        assert_eq!(config.chunking.long_horizon_days, 60);
        assert_eq!(config.chunking.max_records_single_pass, 375);
        assert!(InsightsConfig::for_test().validate().is_ok());
    }

    #[test]
    fn test_watchdog_timeout_is_clamped() {
        let mut worker = WorkerConfig::default();
        worker.watchdog_timeout_ms = 100;
        assert_eq!(worker.watchdog_timeout(), Duration::from_millis(5_000));
        worker.watchdog_timeout_ms = 120_000;
        assert_eq!(worker.watchdog_timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_validation_rejects_unordered_steps() {
        let mut config = InsightsConfig::default();
        config.chunking.span_steps = vec![
            ChunkSpanStep { max_days: 120, span_days: 14 },
            ChunkSpanStep { max_days: 30, span_days: 7 },
        ];
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = InsightsConfig::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fingerprint_subset_ignores_operational_fields() {
        let base = InsightsConfig::default();
        let mut tuned = base.clone();
        tuned.cache.ttl_seconds = 30;
        tuned.cache.max_entries = 5;
        tuned.worker.watchdog_timeout_ms = 9_000;
        tuned.circuit_breaker.runtime_error_cooldown_ms = 1;
        assert_eq!(base.fingerprint_subset(), tuned.fingerprint_subset());

        tuned.cache.schema_version = 3;
        assert_ne!(base.fingerprint_subset(), tuned.fingerprint_subset());
    }

    #[test]
    fn test_partial_toml_shape_uses_defaults() {
        let json = serde_json::json!({ "cache": { "ttl_seconds": 5 } });
        let config: InsightsConfig = serde_json::from_value(json).expect("deserializes");
        assert_eq!(config.cache.ttl_seconds, 5);
        assert_eq!(config.cache.max_entries, 50);
        assert!(config.worker.enabled);
    }
}
