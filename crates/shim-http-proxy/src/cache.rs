//! Process-local TTL cache for generated mock payloads.
//!
//! Expiration is lazy: `get` checks the entry's age and evicts it when stale.
//! `cleanup` reclaims memory proactively but is never required for
//! correctness.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Cache entry with its insertion time
#[derive(Clone, Debug)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

impl CacheEntry {
    fn new(value: Value) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() > ttl
    }
}

/// Counters for cache diagnostics
#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub invalidations: u64,
    pub expirations: u64,
    /// Reserved writes dropped because the key was invalidated meanwhile
    pub stale_writes: u64,
    pub size: usize,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Outstanding reservations for one key.
#[derive(Debug)]
struct PendingWrite {
    epoch: u64,
    outstanding: usize,
}

/// Entries and metrics live under one lock so they never disagree.
#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    pending: HashMap<String, PendingWrite>,
    epoch: u64,
    metrics: CacheMetrics,
}

impl CacheState {
    fn insert(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), CacheEntry::new(value));
        self.metrics.inserts += 1;
        self.metrics.size = self.entries.len();
    }

    /// Revoke every reservation taken for `key` so far.
    fn revoke(&mut self, key: &str) {
        if let Some(pending) = self.pending.get_mut(key) {
            self.epoch += 1;
            pending.epoch = self.epoch;
        }
    }
}

/// Mock payload cache keyed by request path.
#[derive(Debug)]
pub struct MockCache {
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl MockCache {
    /// Create a cache whose entries live for `ttl`. A zero TTL expires every
    /// entry as soon as it is stored.
    pub fn new(ttl: Duration) -> Self {
        debug!("Creating mock cache: ttl={}ms", ttl.as_millis());
        Self {
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: &str, value: Value) {
        self.state.write().insert(key, value);
        trace!("Cache insert for key: {}", key);
    }

    /// Fresh value for `key`, evicting it if it has outlived the TTL.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.state.write();

        let expired = match state.entries.get(key) {
            None => {
                trace!("Cache miss for key: {}", key);
                state.metrics.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(self.ttl),
        };

        if expired {
            trace!("Cache entry expired for key: {}", key);
            state.entries.remove(key);
            state.metrics.misses += 1;
            state.metrics.expirations += 1;
            state.metrics.size = state.entries.len();
            return None;
        }

        state.metrics.hits += 1;
        trace!("Cache hit for key: {}", key);
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Remove `key` unconditionally and revoke its outstanding reservations.
    /// Idempotent.
    pub fn delete(&self, key: &str) {
        let mut state = self.state.write();
        state.revoke(key);
        if state.entries.remove(key).is_some() {
            state.metrics.invalidations += 1;
            state.metrics.size = state.entries.len();
            trace!("Cache entry invalidated for key: {}", key);
        }
    }

    /// Clear all cache entries and revoke every outstanding reservation
    pub fn clear(&self) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.entries.clear();
        state.epoch += 1;
        for pending in state.pending.values_mut() {
            pending.epoch = state.epoch;
        }
        state.metrics.size = 0;
        debug!("Mock cache cleared");
    }

    /// Entry count, stale entries included.
    pub fn size(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn cleanup(&self) -> usize {
        let mut state = self.state.write();
        let before = state.entries.len();
        let ttl = self.ttl;
        state.entries.retain(|_, entry| !entry.is_expired(ttl));
        let count = before - state.entries.len();

        if count > 0 {
            debug!("Cleaned up {} expired cache entries", count);
            state.metrics.expirations += count as u64;
            state.metrics.size = state.entries.len();
        }
        count
    }

    /// Get current cache metrics
    pub fn metrics(&self) -> CacheMetrics {
        self.state.read().metrics.clone()
    }

    /// Reserve a later write for `key`.
    ///
    /// The reservation is revoked by any `delete` or `clear` that touches the
    /// key before it is filled, so a value computed from an outdated view of
    /// the upstream never lands in the cache.
    pub fn reserve(self: &Arc<Self>, key: &str) -> Reservation {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let pending = state
            .pending
            .entry(key.to_string())
            .or_insert(PendingWrite {
                epoch: state.epoch,
                outstanding: 0,
            });
        pending.outstanding += 1;

        Reservation {
            cache: Arc::clone(self),
            key: key.to_string(),
            epoch: pending.epoch,
            redeemed: false,
        }
    }

    fn redeem(&self, key: &str, epoch: u64, value: Option<Value>) -> bool {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let Some(pending) = state.pending.get_mut(key) else {
            return false;
        };
        pending.outstanding -= 1;
        let current = pending.epoch == epoch;
        if pending.outstanding == 0 {
            state.pending.remove(key);
        }

        match value {
            Some(value) if current => {
                state.insert(key, value);
                true
            }
            Some(_) => {
                state.metrics.stale_writes += 1;
                debug!("Discarding write for {}: invalidated while reserved", key);
                false
            }
            None => false,
        }
    }
}

/// Pending write for one key, handed out by [`MockCache::reserve`].
///
/// Dropping it without calling [`fill`](Self::fill) gives it back.
#[must_use]
#[derive(Debug)]
pub struct Reservation {
    cache: Arc<MockCache>,
    key: String,
    epoch: u64,
    redeemed: bool,
}

impl Reservation {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store `value` unless the key was invalidated since the reservation was
    /// taken. Returns whether the value was stored.
    pub fn fill(mut self, value: Value) -> bool {
        self.redeemed = true;
        self.cache.redeem(&self.key, self.epoch, Some(value))
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.redeemed {
            self.cache.redeem(&self.key, self.epoch, None);
        }
    }
}

/// Cache key for a request: the effective path, plus the raw query when asked.
pub fn cache_key(path: &str, query: Option<&str>, include_query: bool) -> String {
    match query {
        Some(q) if include_query && !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_string(),
    }
}
