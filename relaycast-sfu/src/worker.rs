//! SFU worker liveness
//!
//! The worker is the singleton backing every room. Its death is fatal to
//! the whole service: registries built on it cannot be trusted afterwards,
//! so the server observes the `died` watch channel, logs, and exits after
//! a bounded grace period. There is no in-process restart.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::error;

pub struct Worker {
    died_tx: watch::Sender<bool>,
    died: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl Worker {
    #[must_use]
    pub fn new() -> Self {
        let (died_tx, _) = watch::channel(false);
        Self {
            died_tx,
            died: AtomicBool::new(false),
            reason: Mutex::new(None),
        }
    }

    /// Channel that flips to `true` exactly once, when the worker dies
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.died_tx.subscribe()
    }

    /// Record the worker's death. Only the first call takes effect.
    pub fn mark_died(&self, reason: impl Into<String>) {
        if self.died.swap(true, Ordering::SeqCst) {
            return;
        }
        let reason = reason.into();
        error!(reason = %reason, "SFU worker died");
        *self.reason.lock() = Some(reason);
        self.died_tx.send_replace(true);
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.died.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn death_reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_death_is_observed_and_sticky() {
        let worker = Worker::new();
        let mut rx = worker.subscribe();

        assert!(worker.is_alive());
        assert!(!*rx.borrow());

        worker.mark_died("segfault in media loop");
        worker.mark_died("second report ignored");

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(!worker.is_alive());
        assert_eq!(
            worker.death_reason().as_deref(),
            Some("segfault in media loop")
        );
    }
}
