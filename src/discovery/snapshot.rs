//! Name caches that are rebuilt from scratch in the background
//!
//! A `SnapshotSource` produces a complete host -> name mapping. The refresh
//! loop builds each new mapping without holding any lock and then swaps it
//! into the `SnapshotCache` in one step, so lookups always see either the
//! previous or the new complete mapping. A failed load leaves the previous
//! mapping in place.

use crate::Result;
use async_trait::async_trait;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Atomically replaceable name mapping.
pub struct SnapshotCache<K> {
    current: RwLock<Arc<HashMap<K, String>>>,
}

impl<K: Eq + Hash> SnapshotCache<K> {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<String>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.snapshot().get(key).cloned()
    }

    /// Swap in a complete new mapping.
    pub fn replace(&self, mapping: HashMap<K, String>) {
        let mapping = Arc::new(mapping);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = mapping;
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Arc<HashMap<K, String>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<K: Eq + Hash> Default for SnapshotCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A backend that can enumerate everything it knows in one pass.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    type Key: Eq + Hash + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<HashMap<Self::Key, String>>;
}

/// Load once and swap on success. Returns whether the cache was replaced.
pub async fn refresh_once<S: SnapshotSource>(source: &S, cache: &SnapshotCache<S::Key>) -> bool {
    match source.load().await {
        Ok(mapping) => {
            debug!(
                source = source.name(),
                entries = mapping.len(),
                "Refreshed name cache"
            );
            cache.replace(mapping);
            true
        }
        Err(e) => {
            warn!(
                source = source.name(),
                error = %e,
                "Could not refresh name cache, keeping previous snapshot"
            );
            false
        }
    }
}

/// Refresh `cache` from `source` every `period` until `cancel` fires. The
/// first refresh happens one period from now.
pub fn spawn_refresh<S: SnapshotSource>(
    source: S,
    cache: Arc<SnapshotCache<S::Key>>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = refresh_once(&source, &cache) => {}
            }
        }

        debug!(source = source.name(), "Refresh loop stopped");
    })
}

/// Populate a new cache once, then keep it fresh in the background.
pub async fn start_refreshing<S: SnapshotSource>(
    source: S,
    period: Duration,
    cancel: CancellationToken,
) -> Arc<SnapshotCache<S::Key>> {
    let cache = Arc::new(SnapshotCache::new());
    refresh_once(&source, &cache).await;
    spawn_refresh(source, cache.clone(), period, cancel);
    cache
}
