//! Per-bucket locks serialising resolution of the same (type, name).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type BucketMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Registry of async locks keyed by resolution bucket.
///
/// Keys are always acquired in sorted order, so two callers needing
/// overlapping bucket sets cannot deadlock. Unused entries are pruned when
/// the last guard for them is dropped.
#[derive(Debug, Clone, Default)]
pub struct ResolutionLocks {
    buckets: Arc<Mutex<BucketMap>>,
}

/// Holds a set of bucket locks until dropped.
#[derive(Debug)]
pub struct BucketGuard {
    guards: Vec<OwnedMutexGuard<()>>,
    keys: Vec<String>,
    buckets: Arc<Mutex<BucketMap>>,
}

impl ResolutionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every bucket in `keys`, waiting for current holders.
    pub async fn acquire<I, S>(&self, keys: I) -> BucketGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
            keys.iter()
                .map(|key| buckets.entry(key.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        tracing::trace!(buckets = ?keys, "Acquired resolution buckets");

        BucketGuard {
            guards,
            keys,
            buckets: Arc::clone(&self.buckets),
        }
    }

    /// Number of buckets currently tracked.
    pub fn active_buckets(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl BucketGuard {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        self.guards.clear();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        for key in &self.keys {
            if buckets.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
                buckets.remove(key);
            }
        }
    }
}
