use std::time::{Duration, Instant};

/// Time-to-live of cached listings, in seconds.
///
/// Zero or negative values disable caching: nothing stored under such a TTL is ever fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ttl(i64);

impl Ttl {
    pub const fn from_secs(seconds: i64) -> Self {
        Self(seconds)
    }

    pub const fn as_secs(&self) -> i64 {
        self.0
    }

    /// Returns `true` when entries can be retained under this TTL.
    pub const fn is_enabled(&self) -> bool {
        self.0 > 0
    }

    /// Returns the TTL as a [`Duration`], or [`None`] when caching is disabled.
    pub fn as_duration(&self) -> Option<Duration> {
        self.is_enabled().then(|| Duration::from_secs(self.0 as u64))
    }
}

/// A cached value with the instant it was inserted and the TTL it was inserted under.
///
/// Entries are never refreshed in place; a newer listing replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Ttl,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, inserted_at: Instant, ttl: Ttl) -> Self {
        Self {
            value,
            inserted_at,
            ttl,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns `true` while `now - inserted_at < ttl`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        match self.ttl.as_duration() {
            Some(ttl) => now.saturating_duration_since(self.inserted_at) < ttl,
            None => false,
        }
    }
}
