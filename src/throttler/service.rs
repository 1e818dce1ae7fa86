//! The throttler's service task and the lock table it owns

use crate::throttler::lock::{ActionLock, WaitHandle};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Messages processed by the service task, in FIFO order
pub(crate) enum Request<K> {
    /// Admit a caller as leader or follower
    Get {
        key: K,
        reply: oneshot::Sender<Admission>,
    },
    /// Leader finished; release and drop its lock
    Delete { key: K, generation: u64 },
    /// Sweep stale locks
    Expire,
    /// Number of locks currently in the table
    Len { reply: oneshot::Sender<usize> },
}

/// Outcome of a `Get`
#[derive(Debug)]
pub(crate) struct Admission {
    pub(crate) leader: bool,
    pub(crate) generation: u64,
    pub(crate) expiry: Duration,
    pub(crate) handle: WaitHandle,
}

/// Key -> in-flight action lock
pub(crate) struct LockTable<K> {
    locks: HashMap<K, ActionLock>,
    expiry: Duration,
    next_generation: u64,
}

impl<K: Hash + Eq + Debug> LockTable<K> {
    pub(crate) fn new(expiry: Duration) -> Self {
        Self {
            locks: HashMap::new(),
            expiry,
            next_generation: 0,
        }
    }

    /// Admit a caller for `key`.
    ///
    /// A stale lock is released and replaced in the same step, so a stale lock
    /// is never handed to a new follower.
    pub(crate) fn get(&mut self, key: K, now: Instant) -> Admission {
        if let Some(lock) = self.locks.get(&key) {
            if !lock.is_stale(now) {
                return Admission {
                    leader: false,
                    generation: lock.generation,
                    expiry: lock.expiry,
                    handle: lock.waiter.subscribe(),
                };
            }
            debug!(?key, generation = lock.generation, "replacing stale action lock");
            lock.waiter.release();
        }

        self.next_generation += 1;
        let lock = ActionLock::new(now, self.expiry, self.next_generation);
        let admission = Admission {
            leader: true,
            generation: lock.generation,
            expiry: lock.expiry,
            handle: lock.waiter.subscribe(),
        };
        self.locks.insert(key, lock);
        admission
    }

    /// Release and remove the lock for `key` if it is still `generation`
    pub(crate) fn delete(&mut self, key: &K, generation: u64) {
        match self.locks.get(key) {
            Some(lock) if lock.generation == generation => {
                lock.waiter.release();
                self.locks.remove(key);
            }
            Some(lock) => {
                debug!(
                    ?key,
                    generation,
                    current = lock.generation,
                    "ignoring release of superseded action lock"
                );
            }
            None => {}
        }
    }

    /// Release and remove every stale lock. Returns how many were removed.
    pub(crate) fn expire(&mut self, now: Instant) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| {
            if lock.is_stale(now) {
                lock.waiter.release();
                false
            } else {
                true
            }
        });
        before - self.locks.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Consume requests until every sender is gone
pub(crate) async fn run<K>(mut table: LockTable<K>, mut rx: mpsc::Receiver<Request<K>>)
where
    K: Hash + Eq + Clone + Debug,
{
    while let Some(request) = rx.recv().await {
        let now = Instant::now();
        match request {
            Request::Get { key, reply } => {
                let admission = table.get(key.clone(), now);
                // The caller went away before learning it was the leader
                if let Err(admission) = reply.send(admission) {
                    if admission.leader {
                        table.delete(&key, admission.generation);
                    }
                }
            }
            Request::Delete { key, generation } => table.delete(&key, generation),
            Request::Expire => {
                let expired = table.expire(now);
                if expired > 0 {
                    debug!(expired, "expired stale action locks");
                }
            }
            Request::Len { reply } => {
                let _ = reply.send(table.len());
            }
        }
    }
    debug!("throttler service stopped");
}

/// Periodically post `Expire` until the throttler is dropped
pub(crate) fn spawn_sweeper<K: Send + 'static>(
    tx: mpsc::WeakSender<Request<K>>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(tx) = tx.upgrade() else {
                break;
            };
            if tx.send(Request::Expire).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPIRY: Duration = Duration::from_millis(100);

    #[test]
    fn first_get_is_leader() {
        let mut table = LockTable::new(EXPIRY);
        let now = Instant::now();

        let first = table.get("fn-a", now);
        let second = table.get("fn-a", now + Duration::from_millis(10));

        assert!(first.leader);
        assert!(!second.leader);
        assert_eq!(first.generation, second.generation);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn keys_are_independent() {
        let mut table = LockTable::new(EXPIRY);
        let now = Instant::now();

        assert!(table.get("fn-a", now).leader);
        assert!(table.get("fn-b", now).leader);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn stale_lock_is_replaced_and_released() {
        let mut table = LockTable::new(EXPIRY);
        let now = Instant::now();

        let first = table.get("fn-a", now);
        let generation = first.generation;
        assert!(!first.handle.is_released());
        let later = now + EXPIRY + Duration::from_millis(1);
        let second = table.get("fn-a", later);

        assert!(second.leader);
        assert_ne!(second.generation, generation);
        assert_eq!(table.len(), 1);
        // The old waiter was released when it was replaced
        assert!(first.handle.is_released());
        assert!(!second.handle.is_released());
    }

    #[test]
    fn delete_releases_matching_generation() {
        let mut table = LockTable::new(EXPIRY);
        let now = Instant::now();

        let admission = table.get("fn-a", now);
        table.delete(&"fn-a", admission.generation);

        assert_eq!(table.len(), 0);
        assert!(admission.handle.is_released());
        // Idempotent on absent keys
        table.delete(&"fn-a", admission.generation);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn delete_ignores_superseded_generation() {
        let mut table = LockTable::new(EXPIRY);
        let now = Instant::now();

        let first = table.get("fn-a", now);
        let second = table.get("fn-a", now + EXPIRY * 2);
        table.delete(&"fn-a", first.generation);

        assert_eq!(table.len(), 1);
        assert!(!table.locks.get("fn-a").unwrap().waiter.is_released());

        table.delete(&"fn-a", second.generation);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn expire_removes_only_stale_locks() {
        let mut table = LockTable::new(EXPIRY);
        let now = Instant::now();

        table.get("old", now);
        table.get("young", now + Duration::from_millis(80));

        let removed = table.expire(now + Duration::from_millis(150));

        assert_eq!(removed, 1);
        assert_eq!(table.len(), 1);
        assert!(table.locks.contains_key("young"));
    }
}
