//! Watchdog, circuit breaker and lease behaviour observed through the
//! orchestrator.

mod common;

use common::{harness, small_dataset, HANG_PREFIX};
use insights_core::config::InsightsConfig;
use insights_core::constants::caveats;
use insights_core::models::{ReportOrigin, SubmitOptions};
use insights_core::resilience::{CircuitState, NotificationKind};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_hung_worker_times_out_to_fallback() {
    let h = harness(InsightsConfig::for_test());

    let report = h
        .orchestrator
        .submit(
            small_dataset(&format!("{HANG_PREFIX}kim")),
            SubmitOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.origin, ReportOrigin::Fallback);
    assert!(report
        .caveats
        .iter()
        .any(|c| c == caveats::WORKER_TIMEOUT_FALLBACK));
    assert!(report.cache_key.is_some());

    let metrics = h.orchestrator.circuit_metrics().unwrap();
    assert_eq!(metrics.timeout_trips, 1);
    assert_eq!(metrics.current_state, CircuitState::Open);
    assert_eq!(h.notifier.count(NotificationKind::WorkerFallback), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_keeps_requests_away_from_worker() {
    let h = harness(InsightsConfig::for_test());

    h.orchestrator
        .submit(
            small_dataset(&format!("{HANG_PREFIX}lou")),
            SubmitOptions::default(),
        )
        .await
        .unwrap();
    let calls_after_timeout = h.engine.calls();

    let report = h
        .orchestrator
        .submit(small_dataset("max"), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(report.origin, ReportOrigin::Fallback);
    assert_eq!(h.engine.calls(), calls_after_timeout);
    assert_eq!(h.orchestrator.circuit_metrics().unwrap().rejected_dispatches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_worker_recovers_after_cooldown() {
    let h = harness(InsightsConfig::for_test());

    h.orchestrator
        .submit(
            small_dataset(&format!("{HANG_PREFIX}ned")),
            SubmitOptions::default(),
        )
        .await
        .unwrap();

    // Timeout cooldown in the test profile is one second
    tokio::time::advance(Duration::from_millis(1_001)).await;

    let report = h
        .orchestrator
        .submit(small_dataset("oli"), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(report.origin, ReportOrigin::Worker);
    let supervisor = h.orchestrator.supervisor().unwrap();
    assert_eq!(supervisor.generation(), 2);
}

#[tokio::test]
async fn test_cached_fallback_is_served_without_redispatch() {
    let mut config = InsightsConfig::for_test();
    config.worker.enabled = false;
    let h = harness(config);
    let inputs = small_dataset("pam");

    let first = h
        .orchestrator
        .submit(inputs.clone(), SubmitOptions::default())
        .await
        .unwrap();
    let second = h
        .orchestrator
        .submit(inputs, SubmitOptions::default())
        .await
        .unwrap();

    assert!(first
        .caveats
        .iter()
        .any(|c| c == caveats::WORKER_DISABLED_FALLBACK));
    assert_eq!(first, second);
    assert_eq!(h.orchestrator.stats().hits, 1);
    assert_eq!(h.engine.calls(), 0);
    assert!(!h.orchestrator.holds_worker_lease());
}

#[tokio::test]
async fn test_enabling_worker_at_runtime_takes_lease() {
    let mut config = InsightsConfig::for_test();
    config.worker.enabled = false;
    let h = harness(config.clone());
    assert!(!h.orchestrator.holds_worker_lease());

    config.worker.enabled = true;
    h.provider.update(config).unwrap();

    assert!(h.orchestrator.holds_worker_lease());
    let report = h
        .orchestrator
        .submit(small_dataset("quin"), SubmitOptions::default())
        .await
        .unwrap();
    assert_eq!(report.origin, ReportOrigin::Worker);
}
