//! The cache's service task and the entry table it owns

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Messages processed by the service task, in FIFO order
pub(crate) enum Request<K, V> {
    Get {
        key: K,
        reply: oneshot::Sender<Option<V>>,
    },
    Set {
        key: K,
        value: V,
        reply: oneshot::Sender<Option<V>>,
    },
    TryInsert {
        key: K,
        value: V,
        reply: oneshot::Sender<Option<V>>,
    },
    Delete {
        key: K,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<(K, V)>>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
    /// Periodic eviction sweep; no reply
    Reap,
}

/// A cached value and its timestamps
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) created: Instant,
    pub(crate) last_access: Instant,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            created: now,
            last_access: now,
        }
    }

    /// Record an access; `last_access` never moves backwards
    pub(crate) fn touch(&mut self, now: Instant) {
        if now > self.last_access {
            self.last_access = now;
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access)
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created)
    }
}

/// Key -> entry, plus the eviction policy
pub(crate) struct CacheTable<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    idle_ttl: Option<Duration>,
    max_age: Option<Duration>,
}

impl<K: Hash + Eq + Clone + Debug, V: Clone> CacheTable<K, V> {
    pub(crate) fn new(idle_ttl: Option<Duration>, max_age: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            idle_ttl,
            max_age,
        }
    }

    fn is_evictable(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        let idle = self.idle_ttl.is_some_and(|ttl| entry.idle_for(now) > ttl);
        let old = self.max_age.is_some_and(|max| entry.age(now) > max);
        idle || old
    }

    pub(crate) fn get(&mut self, key: &K, now: Instant) -> Option<V> {
        let evict = self.entries.get(key)?;
        if self.is_evictable(evict, now) {
            debug!(?key, "evicting expired cache entry on read");
            self.entries.remove(key);
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.touch(now);
        Some(entry.value.clone())
    }

    /// Insert or replace. Returns the replaced value.
    pub(crate) fn set(&mut self, key: K, value: V, now: Instant) -> Option<V> {
        self.entries
            .insert(key, CacheEntry::new(value, now))
            .map(|previous| previous.value)
    }

    /// Insert only if absent (or expired). Returns the existing value otherwise.
    pub(crate) fn try_insert(&mut self, key: K, value: V, now: Instant) -> Option<V> {
        if let Some(existing) = self.get(&key, now) {
            return Some(existing);
        }
        self.entries.insert(key, CacheEntry::new(value, now));
        None
    }

    pub(crate) fn delete(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub(crate) fn snapshot(&self, now: Instant) -> Vec<(K, V)> {
        self.entries
            .iter()
            .filter(|(_, entry)| !self.is_evictable(entry, now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Remove every evictable entry. Returns how many were removed.
    pub(crate) fn reap(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let (idle_ttl, max_age) = (self.idle_ttl, self.max_age);
        self.entries.retain(|_, entry| {
            let idle = idle_ttl.is_some_and(|ttl| entry.idle_for(now) > ttl);
            let old = max_age.is_some_and(|max| entry.age(now) > max);
            !(idle || old)
        });
        before - self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn entry(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }
}

/// Consume requests until every sender is gone
pub(crate) async fn run<K, V>(mut table: CacheTable<K, V>, mut rx: mpsc::Receiver<Request<K, V>>)
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    while let Some(request) = rx.recv().await {
        let now = Instant::now();
        match request {
            Request::Get { key, reply } => {
                let _ = reply.send(table.get(&key, now));
            }
            Request::Set { key, value, reply } => {
                let _ = reply.send(table.set(key, value, now));
            }
            Request::TryInsert { key, value, reply } => {
                let _ = reply.send(table.try_insert(key, value, now));
            }
            Request::Delete { key, reply } => {
                table.delete(&key);
                let _ = reply.send(());
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(table.snapshot(now));
            }
            Request::Len { reply } => {
                let _ = reply.send(table.len());
            }
            Request::Reap => {
                let reaped = table.reap(now);
                if reaped > 0 {
                    debug!(reaped, remaining = table.len(), "reaped idle cache entries");
                }
            }
        }
    }
    debug!("cache service stopped");
}

/// Periodically post `Reap` until the cache is dropped
pub(crate) fn spawn_reaper<K: Send + 'static, V: Send + 'static>(
    tx: mpsc::WeakSender<Request<K, V>>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(tx) = tx.upgrade() else {
                break;
            };
            if tx.send(Request::Reap).await.is_err() {
                break;
            }
        }
    });
}
