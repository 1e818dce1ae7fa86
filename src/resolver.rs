//! Cache-first endpoint resolution with coalesced specialization
//!
//! A lookup that misses the [`ServiceCache`] goes through
//! [`Throttler::run_once`]: the leader asks the [`Specializer`] for a fresh
//! endpoint and stores it, followers read whatever the leader stored. When the
//! leader fails, followers see `NotFound` and may call [`ServiceResolver::resolve`]
//! again to become the next leader.

use crate::cache::ServiceCache;
use crate::error::FnplaneResult;
use crate::throttler::Throttler;
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces a live value for a key on a cache miss
#[async_trait]
pub trait Specializer<K, V>: Send + Sync {
    async fn specialize(&self, key: &K) -> FnplaneResult<V>;
}

/// A resolved value and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<V> {
    pub value: V,
    /// False only for the caller whose own specialization produced the value
    pub from_cache: bool,
}

pub struct ServiceResolver<K, V, S> {
    throttler: Throttler<K>,
    cache: ServiceCache<K, V>,
    specializer: Arc<S>,
}

impl<K, V, S> Clone for ServiceResolver<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            throttler: self.throttler.clone(),
            cache: self.cache.clone(),
            specializer: Arc::clone(&self.specializer),
        }
    }
}

impl<K, V, S> ServiceResolver<K, V, S>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: Specializer<K, V>,
{
    pub fn new(throttler: Throttler<K>, cache: ServiceCache<K, V>, specializer: S) -> Self {
        Self {
            throttler,
            cache,
            specializer: Arc::new(specializer),
        }
    }

    pub fn cache(&self) -> &ServiceCache<K, V> {
        &self.cache
    }

    /// Return the cached value for `key`, specializing at most once on a miss
    pub async fn resolve(&self, key: &K) -> FnplaneResult<Resolved<V>> {
        if let Some(value) = self.lookup(key).await? {
            return Ok(Resolved {
                value,
                from_cache: true,
            });
        }

        self.throttler
            .run_once(key.clone(), |leader| async move {
                if !leader {
                    let value = self.cache.get(key).await?;
                    return Ok(Resolved {
                        value,
                        from_cache: true,
                    });
                }

                // A previous leader may have finished between our miss and our admission
                if let Some(value) = self.lookup(key).await? {
                    return Ok(Resolved {
                        value,
                        from_cache: true,
                    });
                }

                info!(?key, "specializing");
                let value = self
                    .specializer
                    .specialize(key)
                    .await
                    .inspect_err(|e| warn!(?key, error = %e, "specialization failed"))?;
                self.cache.set(key.clone(), value.clone()).await?;
                debug!(?key, "cached specialized value");

                Ok(Resolved {
                    value,
                    from_cache: false,
                })
            })
            .await
    }

    /// Drop the cached value for `key`, e.g. after the endpoint stopped answering
    pub async fn invalidate(&self, key: &K) -> FnplaneResult<()> {
        self.cache.delete(key).await
    }

    async fn lookup(&self, key: &K) -> FnplaneResult<Option<V>> {
        match self.cache.get(key).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
