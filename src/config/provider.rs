//! Hot-swappable configuration handle.
//!
//! The orchestrator receives a [`ConfigProvider`] at construction and registers
//! change callbacks on it; nothing reads configuration from ambient globals.

use super::error::ConfigResult;
use super::InsightsConfig;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

type ChangeCallback = Arc<dyn Fn(&InsightsConfig) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    callbacks: Mutex<BTreeMap<u64, ChangeCallback>>,
    next_id: AtomicU64,
}

/// Shared configuration handle with change subscriptions
pub struct ConfigProvider {
    current: RwLock<Arc<InsightsConfig>>,
    subscribers: Arc<Subscribers>,
}

impl std::fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("current", &self.current.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ConfigProvider {
    /// Create a provider, validating the initial configuration
    pub fn new(config: InsightsConfig) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            current: RwLock::new(Arc::new(config)),
            subscribers: Arc::new(Subscribers::default()),
        }))
    }

    /// Snapshot of the active configuration
    pub fn current(&self) -> Arc<InsightsConfig> {
        Arc::clone(&self.current.read())
    }

    /// Validate and swap in a new configuration, then notify subscribers.
    ///
    /// Callbacks run synchronously on the calling thread after the swap, in
    /// registration order. An invalid configuration leaves the current one in
    /// place and notifies nobody.
    pub fn update(&self, config: InsightsConfig) -> ConfigResult<()> {
        config.validate()?;
        let next = Arc::new(config);
        {
            let mut current = self.current.write();
            if **current == *next {
                debug!("Configuration update is a no-op");
                return Ok(());
            }
            *current = Arc::clone(&next);
        }

        // Clone out so callbacks may subscribe or unsubscribe without deadlocking
        let callbacks: Vec<ChangeCallback> =
            self.subscribers.callbacks.lock().values().cloned().collect();
        info!(subscribers = callbacks.len(), "🔄 Configuration updated");
        for callback in callbacks {
            callback(&next);
        }
        Ok(())
    }

    /// Register a change callback; it stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InsightsConfig) + Send + Sync + 'static,
    {
        let id = self.subscribers.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .callbacks
            .lock()
            .insert(id, Arc::new(callback));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.callbacks.lock().len()
    }
}

/// Guard that unregisters its callback on drop
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.callbacks.lock().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_update_notifies_subscribers() {
        let provider = ConfigProvider::new(InsightsConfig::default()).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let _sub = provider.subscribe(move |config| {
            seen_clone.store(config.cache.max_entries, Ordering::SeqCst);
        });

        let mut next = InsightsConfig::default();
        next.cache.max_entries = 7;
        provider.update(next).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(provider.current().cache.max_entries, 7);
    }

    #[test]
    fn test_invalid_update_keeps_current_config() {
        let provider = ConfigProvider::new(InsightsConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let _sub = provider.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mut bad = InsightsConfig::default();
        bad.cache.max_entries = 0;
        assert!(provider.update(bad).is_err());
        assert_eq!(provider.current().cache.max_entries, 50);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let provider = ConfigProvider::new(InsightsConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let sub = provider.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(provider.subscriber_count(), 1);
        drop(sub);
        assert_eq!(provider.subscriber_count(), 0);

        let mut next = InsightsConfig::default();
        next.cache.ttl_seconds = 10;
        provider.update(next).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_identical_update_is_silent() {
        let provider = ConfigProvider::new(InsightsConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let _sub = provider.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        provider.update(InsightsConfig::default()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
