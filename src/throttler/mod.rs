//! Cold-start coalescing
//!
//! When many requests arrive for a function with no warm endpoint, exactly one
//! caller (the leader) should drive specialization while the rest (followers)
//! wait for it to finish. [`Throttler::run_once`] provides that guarantee per
//! key:
//!
//! ```rust,ignore
//! let url = throttler
//!     .run_once(function_key.clone(), |leader| async move {
//!         if leader {
//!             let url = executor.specialize(&function_key).await?;
//!             cache.set(function_key, url.clone()).await?;
//!             Ok(url)
//!         } else {
//!             cache.get(&function_key).await
//!         }
//!     })
//!     .await?;
//! ```
//!
//! The lock table is owned by a single service task; callers talk to it over a
//! bounded channel, so a burst of callers back-pressures on the channel rather
//! than queueing without limit.

mod lock;
mod service;

use crate::error::{FnplaneError, FnplaneResult};
use service::{Admission, LockTable, Request};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Default bound of the request channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Tuning for a [`Throttler`]
#[derive(Debug, Clone)]
pub struct ThrottlerOptions {
    /// How long a lock stays valid, and how long followers wait for it
    pub lock_expiry: Duration,
    /// How often stale locks are swept (`None` disables the sweeper)
    pub sweep_interval: Option<Duration>,
    /// Bound of the request channel
    pub channel_capacity: usize,
}

impl Default for ThrottlerOptions {
    fn default() -> Self {
        Self {
            lock_expiry: Duration::from_secs(30),
            sweep_interval: Some(Duration::from_secs(60)),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// At-most-one in-flight computation per key
///
/// Cloning is cheap; all clones share the same lock table.
pub struct Throttler<K = String> {
    tx: mpsc::Sender<Request<K>>,
}

impl<K> Clone for Throttler<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K> Throttler<K>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
{
    /// Create a throttler with the given lock expiry and default sweeping.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(lock_expiry: Duration) -> Self {
        Self::with_options(ThrottlerOptions {
            lock_expiry,
            ..ThrottlerOptions::default()
        })
    }

    /// Create a throttler from explicit options
    pub fn with_options(options: ThrottlerOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let table = LockTable::new(options.lock_expiry);
        tokio::spawn(service::run(table, rx));

        if let Some(interval) = options.sweep_interval.filter(|i| !i.is_zero()) {
            service::spawn_sweeper(tx.downgrade(), interval);
        }

        debug!(
            lock_expiry_ms = options.lock_expiry.as_millis() as u64,
            "throttler started"
        );
        Self { tx }
    }

    /// Run `work` at most once concurrently for `key`.
    ///
    /// The leader runs `work(true)`. Followers wait for the leader to finish,
    /// then run `work(false)`; a follower that waits longer than the lock
    /// expiry returns [`FnplaneError::Timeout`] without running `work`. A
    /// leader's failure is not forwarded to followers: each follower's own
    /// `work(false)` decides what the released state means.
    pub async fn run_once<T, F, Fut>(&self, key: K, work: F) -> FnplaneResult<T>
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = FnplaneResult<T>>,
    {
        let admission = self.admit(key.clone()).await?;

        if !admission.leader {
            if !admission.handle.wait(admission.expiry).await {
                debug!(?key, "follower timed out waiting for action lock");
                return Err(FnplaneError::Timeout);
            }
            return work(false).await;
        }

        // Released on return, error, panic or cancellation
        let _release = LeaderGuard {
            tx: self.tx.clone(),
            key: Some(key),
            generation: admission.generation,
        };
        work(true).await
    }

    /// Number of keys with a computation currently considered in flight
    pub async fn in_flight(&self) -> FnplaneResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Len { reply })
            .await
            .map_err(|_| FnplaneError::ChannelClosed("throttler"))?;
        rx.await.map_err(|_| FnplaneError::ChannelClosed("throttler"))
    }

    async fn admit(&self, key: K) -> FnplaneResult<Admission> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Get { key, reply })
            .await
            .map_err(|_| FnplaneError::ChannelClosed("throttler"))?;
        rx.await.map_err(|_| FnplaneError::ChannelClosed("throttler"))
    }
}

/// Posts `Delete` for the leader's lock when dropped
struct LeaderGuard<K: Send + 'static> {
    tx: mpsc::Sender<Request<K>>,
    key: Option<K>,
    generation: u64,
}

impl<K: Send + 'static> Drop for LeaderGuard<K> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let request = Request::Delete {
            key,
            generation: self.generation,
        };

        // Never block the leader's return path on the service task
        match self.tx.try_send(request) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(request)) => {
                if let Ok(handle) = Handle::try_current() {
                    let tx = self.tx.clone();
                    handle.spawn(async move {
                        let _ = tx.send(request).await;
                    });
                }
            }
        }
    }
}
