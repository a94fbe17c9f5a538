use dashmap::DashMap;
use std::hash::Hash;

use crate::cache::entry::{CacheEntry, Ttl};
use crate::clock::SharedClock;

/// Concurrent map from a sub-key to a [`CacheEntry`].
///
/// Reads and writes on the same sub-key are linearizable. Writers racing on one sub-key are
/// all publishing the same remote truth, so the last write wins. Stale entries stay in the
/// map until they are overwritten or purged.
#[derive(Debug)]
pub struct CacheStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Ttl,
    clock: SharedClock,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Ttl, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Returns a copy of the value for `key` if it is present and fresh.
    pub fn get(&self, key: &K) -> Option<V> {
        if !self.ttl.is_enabled() {
            return None;
        }

        let entry = self.entries.get(key)?;
        if !entry.is_fresh(self.clock.now()) {
            return None;
        }

        Some(entry.value().value().clone())
    }

    /// Inserts or replaces the value for `key`, stamped with the current time.
    ///
    /// A no-op when the store's TTL disables caching.
    pub fn put(&self, key: K, value: V) {
        if !self.ttl.is_enabled() {
            return;
        }

        let entry = CacheEntry::new(value, self.clock.now(), self.ttl);
        self.entries.insert(key, entry);
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Removes every entry that is no longer fresh and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));

        before.saturating_sub(self.entries.len())
    }

    /// Returns the keys of every fresh entry.
    pub fn fresh_keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        if !self.ttl.is_enabled() {
            return Vec::new();
        }

        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| entry.value().is_fresh(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of physically stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
