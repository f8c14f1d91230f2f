//! Run-scoped load-once cache
//!
//! Concurrent requests for the same uncached key share one in-flight load.
//! Failed loads are not cached, so the next caller retries.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// Single-flight cache of async lookups
pub struct LoadOnceCache<K, V> {
    inner: Arc<Mutex<HashMap<K, Arc<OnceCell<V>>>>>,
}

impl<K, V> Clone for LoadOnceCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for LoadOnceCache<K, V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> LoadOnceCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, or run `load` to produce it.
    ///
    /// While one caller is loading, others asking for the same key wait for
    /// that load instead of starting their own.
    pub async fn get_or_try_load<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(key).or_default())
        };
        cell.get_or_try_init(load).await.cloned()
    }

    /// Cached value, if a load for `key` has completed
    pub async fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.lock().await;
        map.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of keys with a completed load
    pub async fn len(&self) -> usize {
        let map = self.inner.lock().await;
        map.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K, V> std::fmt::Debug for LoadOnceCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOnceCache").finish_non_exhaustive()
    }
}
