//! Action locks and their one-shot release signal

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Close-once broadcast signal
///
/// Releasing is idempotent: every subscriber, whether it subscribed before or
/// after the release, observes it exactly the same way.
#[derive(Debug)]
pub(crate) struct Waiter {
    tx: watch::Sender<bool>,
}

impl Waiter {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Wake every follower
    pub(crate) fn release(&self) {
        self.tx.send_replace(true);
    }

    #[cfg(test)]
    pub(crate) fn is_released(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> WaitHandle {
        WaitHandle {
            rx: self.tx.subscribe(),
        }
    }
}

/// A follower's view of a [`Waiter`]
#[derive(Debug)]
pub(crate) struct WaitHandle {
    rx: watch::Receiver<bool>,
}

impl WaitHandle {
    /// Wait for release, giving up after `timeout`.
    ///
    /// Returns `true` when released. A dropped waiter counts as released: the
    /// lock table only drops a waiter after releasing it, or when the throttler
    /// itself shuts down.
    pub(crate) async fn wait(mut self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.rx.wait_for(|released| *released))
            .await
            .is_ok()
    }

    #[cfg(test)]
    pub(crate) fn is_released(&self) -> bool {
        *self.rx.borrow()
    }
}

/// A single in-flight computation for one key
#[derive(Debug)]
pub(crate) struct ActionLock {
    pub(crate) waiter: Waiter,
    pub(crate) created: Instant,
    pub(crate) expiry: Duration,
    /// Distinguishes successive locks for the same key
    pub(crate) generation: u64,
}

impl ActionLock {
    pub(crate) fn new(created: Instant, expiry: Duration, generation: u64) -> Self {
        Self {
            waiter: Waiter::new(),
            created,
            expiry,
            generation,
        }
    }

    pub(crate) fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) > self.expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_staleness() {
        let now = Instant::now();
        let lock = ActionLock::new(now, Duration::from_millis(50), 1);

        assert!(!lock.is_stale(now));
        assert!(!lock.is_stale(now + Duration::from_millis(50)));
        assert!(lock.is_stale(now + Duration::from_millis(51)));
    }

    #[test]
    fn release_is_idempotent() {
        let waiter = Waiter::new();
        assert!(!waiter.is_released());

        waiter.release();
        waiter.release();
        assert!(waiter.is_released());
    }

    #[tokio::test]
    async fn late_subscriber_sees_release() {
        let waiter = Waiter::new();
        waiter.release();

        let handle = waiter.subscribe();
        assert!(handle.wait(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_without_release() {
        let waiter = Waiter::new();
        let handle = waiter.subscribe();

        assert!(!handle.wait(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn release_wakes_all_subscribers() {
        let waiter = Waiter::new();
        let handles: Vec<_> = (0..8).map(|_| waiter.subscribe()).collect();

        let tasks: Vec<_> = handles
            .into_iter()
            .map(|h| tokio::spawn(h.wait(Duration::from_secs(5))))
            .collect();

        waiter.release();

        for task in tasks {
            assert!(task.await.unwrap());
        }
    }
}
