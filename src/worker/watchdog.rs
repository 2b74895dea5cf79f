//! Per-request deadline timer.
//!
//! Dropping an unfired [`Watchdog`] cancels it. Once the deadline passes the
//! expiry future runs to completion even if the handle is dropped from inside
//! that future.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Watchdog {
    handle: JoinHandle<()>,
    fired: Arc<AtomicBool>,
    timeout: Duration,
}

impl Watchdog {
    /// Run `on_expire` after `timeout` unless disarmed first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(timeout: Duration, on_expire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            flag.store(true, Ordering::SeqCst);
            on_expire.await;
        });
        Self {
            handle,
            fired,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Cancel the timer if it has not fired yet
    pub fn disarm(self) {
        drop(self);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if !self.fired.load(Ordering::SeqCst) {
            self.handle.abort();
        }
    }
}
