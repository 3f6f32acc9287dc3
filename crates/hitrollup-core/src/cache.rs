//! Short-lived read-through caches for aggregate baselines.
//!
//! Storage stays the source of truth: losing an entry only costs one extra
//! baseline read on the next aggregation pass.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::hit::{BucketKey, RefKey};

/// Cached `(total, total_unique)` pair of one counter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterEntry {
    pub total: i64,
    pub total_unique: i64,
}

/// Key/value cache where every entry expires `ttl` after its last `set`.
///
/// Expired entries are never returned by [`TtlCache::get`]; they are removed
/// from memory by [`TtlCache::sweep_expired`], which the owner calls every
/// [`TtlCache::sweep_interval`].
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, (V, Instant)>>,
    ttl: Duration,
    sweep_interval: Duration,
    enabled: bool,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            sweep_interval,
            enabled: true,
        }
    }

    /// A cache that never stores anything: every `get` misses.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO, Duration::from_secs(3600))
        }
    }

    // A poisoned lock only means another thread panicked mid-insert; the map
    // itself is still a valid cache.
    fn lock(&self) -> MutexGuard<'_, HashMap<K, (V, Instant)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if !self.enabled {
            return None;
        }
        let map = self.lock();
        match map.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            _ => None,
        }
    }

    /// Insert or overwrite `key`, restarting its TTL.
    pub fn set(&self, key: K, value: V) {
        if !self.enabled {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        self.lock().insert(key, (value, expires_at));
    }

    pub fn flush(&self) {
        self.lock().clear();
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, (_, expires_at)| *expires_at > now);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

/// The baseline caches used by the aggregation pipeline.
///
/// Constructed once by the owner of the pipeline and passed to every
/// aggregation call.
pub struct StatsCaches {
    pub hit_counts: TtlCache<BucketKey, CounterEntry>,
    pub ref_counts: TtlCache<RefKey, CounterEntry>,
}

impl StatsCaches {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            hit_counts: TtlCache::new(ttl, sweep_interval),
            ref_counts: TtlCache::new(ttl, sweep_interval),
        }
    }

    pub fn disabled() -> Self {
        Self {
            hit_counts: TtlCache::disabled(),
            ref_counts: TtlCache::disabled(),
        }
    }

    /// Flush every cache. Used after reindexing and by the admin reset route.
    pub fn reset(&self) {
        self.hit_counts.flush();
        self.ref_counts.flush();
    }

    pub fn sweep_expired(&self) -> usize {
        self.hit_counts.sweep_expired() + self.ref_counts.sweep_expired()
    }

    pub fn sweep_interval(&self) -> Duration {
        self.hit_counts.sweep_interval()
    }
}

impl Default for StatsCaches {
    /// One hour TTL, swept every five minutes.
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), Duration::from_secs(300))
    }
}
