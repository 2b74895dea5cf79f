//! # User Notifications
//!
//! Systemic failures (worker crashed, circuit open, worker disabled) are
//! reported to the user through a [`Notifier`], at most once per window per
//! kind. The same [`RateLimiter`] also throttles repetitive log lines.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Background analysis failed or is cooling down; fallback in use
    WorkerFallback,
    /// Background analysis is switched off by configuration
    WorkerDisabled,
    /// Remote analysis failed; local heuristics in use
    RemoteDegraded,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::WorkerFallback => "worker_fallback",
            NotificationKind::WorkerDisabled => "worker_disabled",
            NotificationKind::RemoteDegraded => "remote_degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn worker_fallback(detail: impl Into<String>) -> Self {
        Self::new(
            NotificationKind::WorkerFallback,
            "Analytics running in fallback mode",
            detail,
        )
    }

    pub fn worker_disabled() -> Self {
        Self::new(
            NotificationKind::WorkerDisabled,
            "Background analytics disabled",
            "Results are computed with the simplified in-process engine.",
        )
    }

    pub fn remote_degraded(detail: impl Into<String>) -> Self {
        Self::new(
            NotificationKind::RemoteDegraded,
            "AI analysis unavailable",
            detail,
        )
    }
}

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        warn!(
            kind = notification.kind.as_str(),
            title = %notification.title,
            description = %notification.description,
            "📣 User notification"
        );
    }
}

/// Allows one event per key per window
#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<Duration>,
    last_allowed: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window: Mutex::new(window),
            last_allowed: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true (and records the event) if `key` has not been allowed
    /// within the current window
    pub fn allow(&self, key: &str) -> bool {
        let window = *self.window.lock();
        let now = Instant::now();
        let mut last = self.last_allowed.lock();
        if matches!(last.get(key), Some(at) if now.duration_since(*at) < window) {
            return false;
        }
        // Entries outside the window can no longer suppress anything
        last.retain(|_, at| now.duration_since(*at) < window);
        last.insert(key.to_string(), now);
        true
    }

    /// Keys currently inside their window
    pub fn tracked_keys(&self) -> usize {
        self.last_allowed.lock().len()
    }

    pub fn set_window(&self, window: Duration) {
        *self.window.lock() = window;
    }

    pub fn reset(&self) {
        self.last_allowed.lock().clear();
    }
}

/// Wraps a notifier so each kind fires at most once per window
pub struct RateLimitedNotifier {
    inner: Arc<dyn Notifier>,
    limiter: RateLimiter,
}

impl std::fmt::Debug for RateLimitedNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedNotifier")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl RateLimitedNotifier {
    pub fn new(inner: Arc<dyn Notifier>, window: Duration) -> Self {
        Self {
            inner,
            limiter: RateLimiter::new(window),
        }
    }

    /// Forward the notification unless its kind already fired this window.
    /// Returns whether it was delivered.
    pub fn notify(&self, notification: &Notification) -> bool {
        if self.limiter.allow(notification.kind.as_str()) {
            self.inner.notify(notification);
            true
        } else {
            debug!(kind = notification.kind.as_str(), "Notification suppressed by rate limit");
            false
        }
    }

    pub fn set_window(&self, window: Duration) {
        self.limiter.set_window(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    impl Notifier for CountingNotifier {
        fn notify(&self, _notification: &Notification) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_notification_per_kind_per_window() {
        let counter = Arc::new(CountingNotifier::default());
        let notifier = RateLimitedNotifier::new(counter.clone(), Duration::from_secs(60));

        for _ in 0..5 {
            notifier.notify(&Notification::worker_fallback("crash"));
        }
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        // Different kinds are limited independently
        assert!(notifier.notify(&Notification::worker_disabled()));
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(notifier.notify(&Notification::worker_fallback("crash again")));
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(limiter.allow("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_forgets_expired_keys() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        for i in 0..100 {
            assert!(limiter.allow(&format!("key-{i}")));
        }
        assert_eq!(limiter.tracked_keys(), 100);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(limiter.allow("fresh"));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
