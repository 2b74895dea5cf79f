//! # Structured Logging Module
//!
//! Environment-aware structured logging for the orchestrator, the worker
//! supervisor and the analysis pipelines. Set `INSIGHTS_LOG_FORMAT=json` for
//! machine-readable output; `RUST_LOG` always wins over the environment default.

use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_tracing() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("INSIGHTS_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter)
                .boxed()
        };

        // A host application may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
pub fn get_environment() -> String {
    std::env::var("INSIGHTS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "warn".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log a worker supervisor lifecycle event
#[macro_export]
macro_rules! log_worker {
    ($level:ident, $operation:expr, $($field:tt)*) => {
        tracing::$level!(
            component = "worker_supervisor",
            operation = %$operation,
            $($field)*
        )
    };
}

/// Log a result cache event
#[macro_export]
macro_rules! log_cache {
    ($level:ident, $operation:expr, $($field:tt)*) => {
        tracing::$level!(
            component = "result_cache",
            operation = %$operation,
            $($field)*
        )
    };
}

/// Log an analysis pipeline event
#[macro_export]
macro_rules! log_pipeline {
    ($level:ident, $operation:expr, $($field:tt)*) => {
        tracing::$level!(
            component = "analysis_pipeline",
            operation = %$operation,
            $($field)*
        )
    };
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "warn");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        log_worker!(debug, "probe", generation = 1u64, "worker macro expands");
        log_cache!(debug, "probe", key = "k", "cache macro expands");
        log_pipeline!(debug, "probe", chunks = 2usize, "pipeline macro expands");
    }
}
