use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

use crate::cache::entry::Ttl;
use crate::cache::store::CacheStore;
use crate::clock::{SharedClock, system_clock};

/// Identifies a cache store: the account (project) it caches and the TTL it was configured with.
///
/// Callers against the same account with different TTLs get separate stores, so a short-TTL
/// caller is never served data cached under a longer TTL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub account_id: String,
    pub ttl: Ttl,
}

impl CacheKey {
    pub fn new(account_id: impl Into<String>, ttl_seconds: i64) -> Self {
        Self {
            account_id: account_id.into(),
            ttl: Ttl::from_secs(ttl_seconds),
        }
    }
}

/// Process-wide mapping from [`CacheKey`] to a shared [`CacheStore`].
///
/// Stores are created on first use and live until [`CacheRegistry::clear_all`]. Closing a
/// connection never removes a store, so connections opened and closed in quick succession
/// against the same project keep hitting warm entries.
#[derive(Debug)]
pub struct CacheRegistry<K, V>
where
    K: Eq + Hash,
{
    stores: DashMap<CacheKey, Arc<CacheStore<K, V>>>,
    clock: SharedClock,
}

impl<K, V> CacheRegistry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Creates a registry whose stores all read time from `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            stores: DashMap::new(),
            clock,
        }
    }

    /// Returns the store for `(account_id, ttl_seconds)`, creating it if absent.
    ///
    /// Concurrent first callers for one key all receive the same instance: creation happens
    /// under the map shard's write lock.
    pub fn store_for(&self, account_id: &str, ttl_seconds: i64) -> Arc<CacheStore<K, V>> {
        let key = CacheKey::new(account_id, ttl_seconds);

        if let Some(store) = self.stores.get(&key) {
            return store.clone();
        }

        self.stores
            .entry(key)
            .or_insert_with(|| {
                debug!(account_id, ttl_seconds, "creating metadata cache store");
                Arc::new(CacheStore::new(Ttl::from_secs(ttl_seconds), self.clock.clone()))
            })
            .clone()
    }

    /// Drops every store. Stores already handed out keep working but are no longer shared.
    pub fn clear_all(&self) {
        let count = self.stores.len();
        self.stores.clear();

        debug!(count, "cleared metadata cache registry");
    }

    /// Number of stores currently tracked.
    pub fn count(&self) -> usize {
        self.stores.len()
    }
}

impl<K, V> Default for CacheRegistry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
