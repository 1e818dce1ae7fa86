//! Function service cache
//!
//! Maps a function identity to a live endpoint. The map is owned by one
//! service task and every operation is a message on a bounded channel, so
//! operations are totally ordered: a `set` that has returned is visible to
//! every `get` issued after it.

mod service;

use crate::error::{FnplaneError, FnplaneResult};
use service::{CacheTable, Request};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Default bound of the request channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Tuning for a [`ServiceCache`]
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Evict entries not read for this long (`None` keeps them)
    pub idle_ttl: Option<Duration>,
    /// Evict entries created longer ago than this (`None` keeps them)
    pub max_age: Option<Duration>,
    /// How often the reaper sweeps; only used when an eviction rule is set
    pub sweep_interval: Duration,
    /// Bound of the request channel
    pub channel_capacity: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            idle_ttl: None,
            max_age: None,
            sweep_interval: Duration::from_secs(60),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Single-owner, request-serialized map
///
/// Cloning is cheap; all clones talk to the same owner task. Values are
/// handed out as clones, so `V` should be a cheap handle (a URL, an `Arc`).
pub struct ServiceCache<K = String, V = String> {
    tx: mpsc::Sender<Request<K, V>>,
}

impl<K, V> Clone for ServiceCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K, V> ServiceCache<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache without eviction.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self::with_options(CacheOptions::default())
    }

    /// Create a cache whose entries are evicted after `idle_ttl` without reads
    pub fn with_idle_ttl(idle_ttl: Duration, sweep_interval: Duration) -> Self {
        Self::with_options(CacheOptions {
            idle_ttl: Some(idle_ttl),
            sweep_interval,
            ..CacheOptions::default()
        })
    }

    /// Create a cache from explicit options
    pub fn with_options(options: CacheOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let table = CacheTable::new(options.idle_ttl, options.max_age);
        tokio::spawn(service::run(table, rx));

        let evicts = options.idle_ttl.is_some() || options.max_age.is_some();
        if evicts && !options.sweep_interval.is_zero() {
            service::spawn_reaper(tx.downgrade(), options.sweep_interval);
        }

        debug!(
            idle_ttl = ?options.idle_ttl,
            max_age = ?options.max_age,
            "service cache started"
        );
        Self { tx }
    }

    /// Look up `key`, refreshing its last-access time.
    ///
    /// Returns [`FnplaneError::NotFound`] when the key is absent or expired.
    pub async fn get(&self, key: &K) -> FnplaneResult<V> {
        let key = key.clone();
        let value = self
            .call(|reply| Request::Get {
                key: key.clone(),
                reply,
            })
            .await?;
        value.ok_or_else(|| FnplaneError::NotFound(format!("{:?}", key)))
    }

    /// Insert or replace `key`. Returns the value it replaced, if any.
    pub async fn set(&self, key: K, value: V) -> FnplaneResult<Option<V>> {
        self.call(|reply| Request::Set { key, value, reply }).await
    }

    /// Insert `key` only if it is not already present.
    ///
    /// Returns `None` when the value was inserted, or the existing value when
    /// the key was taken.
    pub async fn try_insert(&self, key: K, value: V) -> FnplaneResult<Option<V>> {
        self.call(|reply| Request::TryInsert { key, value, reply })
            .await
    }

    /// Remove `key` if present
    pub async fn delete(&self, key: &K) -> FnplaneResult<()> {
        let key = key.clone();
        self.call(|reply| Request::Delete { key, reply }).await
    }

    /// Copy of every live entry
    pub async fn snapshot(&self) -> FnplaneResult<Vec<(K, V)>> {
        self.call(|reply| Request::Snapshot { reply }).await
    }

    /// Number of entries held, including ones the reaper has not reached yet
    pub async fn len(&self) -> FnplaneResult<usize> {
        self.call(|reply| Request::Len { reply }).await
    }

    /// Check if the cache holds no entries
    pub async fn is_empty(&self) -> FnplaneResult<bool> {
        Ok(self.len().await? == 0)
    }

    async fn call<R>(
        &self,
        request: impl FnOnce(oneshot::Sender<R>) -> Request<K, V>,
    ) -> FnplaneResult<R> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(request(reply))
            .await
            .map_err(|_| FnplaneError::ChannelClosed("cache"))?;
        rx.await.map_err(|_| FnplaneError::ChannelClosed("cache"))
    }
}

impl<K, V> Default for ServiceCache<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use tokio::time::sleep;

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let cache: ServiceCache<String, u32> = ServiceCache::new();

        cache.set("a".to_string(), 1).await.unwrap();
        assert_eq!(cache.get(&"a".to_string()).await.unwrap(), 1);

        cache.delete(&"a".to_string()).await.unwrap();
        let err = cache.get(&"a".to_string()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_missing_key_is_noop() {
        let cache: ServiceCache<String, u32> = ServiceCache::new();
        cache.delete(&"missing".to_string()).await.unwrap();
        assert!(cache.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn set_replaces_existing_value() {
        let cache: ServiceCache = ServiceCache::new();

        assert_eq!(
            cache
                .set("fn".to_string(), "http://10.0.0.1".to_string())
                .await
                .unwrap(),
            None
        );
        let replaced = cache
            .set("fn".to_string(), "http://10.0.0.2".to_string())
            .await
            .unwrap();

        assert_eq!(replaced.as_deref(), Some("http://10.0.0.1"));
        assert_eq!(cache.get(&"fn".to_string()).await.unwrap(), "http://10.0.0.2");
    }

    #[tokio::test]
    async fn try_insert_reports_existing() {
        let cache: ServiceCache<String, u32> = ServiceCache::new();

        assert_eq!(cache.try_insert("a".to_string(), 1).await.unwrap(), None);
        assert_eq!(cache.try_insert("a".to_string(), 2).await.unwrap(), Some(1));
        assert_eq!(cache.get(&"a".to_string()).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_entries_are_evicted() {
        let cache: ServiceCache<String, u32> =
            ServiceCache::with_idle_ttl(Duration::from_secs(1), Duration::from_millis(100));

        cache.set("a".to_string(), 1).await.unwrap();
        sleep(Duration::from_millis(1200)).await;

        // The reaper has already removed it; get never saw it
        assert_eq!(cache.len().await.unwrap(), 0);
        assert!(cache.get(&"a".to_string()).await.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn reads_keep_entries_alive() {
        let cache: ServiceCache<String, u32> =
            ServiceCache::with_idle_ttl(Duration::from_secs(1), Duration::from_millis(100));

        cache.set("a".to_string(), 1).await.unwrap();
        for _ in 0..5 {
            sleep(Duration::from_millis(600)).await;
            assert_eq!(cache.get(&"a".to_string()).await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn operations_are_serialized() {
        let cache: ServiceCache<String, usize> = ServiceCache::new();

        let writers = (0..50).map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache.set(format!("fn-{}", i % 5), i).await.unwrap();
                // Our own write, or a later one, is always visible afterwards
                cache.get(&format!("fn-{}", i % 5)).await.unwrap()
            })
        });
        for result in join_all(writers).await {
            result.unwrap();
        }

        let mut keys: Vec<_> = cache
            .snapshot()
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["fn-0", "fn-1", "fn-2", "fn-3", "fn-4"]);
    }

    #[tokio::test]
    async fn snapshot_copies_values() {
        let cache: ServiceCache<String, u32> = ServiceCache::new();
        cache.set("a".to_string(), 1).await.unwrap();

        let snapshot = cache.snapshot().await.unwrap();
        cache.set("a".to_string(), 2).await.unwrap();

        assert_eq!(snapshot, vec![("a".to_string(), 1)]);
    }
}
