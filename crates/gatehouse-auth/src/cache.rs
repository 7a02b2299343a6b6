//! Tiered caches for verified tokens and resolved authorizations
//!
//! Both tiers sit on [`HighWaterCache`]: an insertion-ordered map that, once it
//! reaches `max_size`, drops its `eviction_batch_size` oldest entries before the
//! next new key goes in. Eviction is FIFO by insertion, not by access.
//!
//! - [`TokenCache`]: raw token → verified claims, TTL-gated on read
//! - [`AuthzCache`]: (username, host+path) → route decision, eviction only
//!
//! Each tier guards its map with a `parking_lot::Mutex` that is only held for
//! a single map operation and never across an `.await`.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::config::CacheLimits;
use crate::routes::RouteDecision;
use crate::token::SessionClaims;

/// Insertion-ordered map with batched high-water-mark eviction
#[derive(Debug)]
pub struct HighWaterCache<K, V> {
    entries: IndexMap<K, V>,
    limits: CacheLimits,
}

impl<K, V> HighWaterCache<K, V>
where
    K: Hash + Eq,
{
    /// Create an empty cache
    #[must_use]
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            entries: IndexMap::new(),
            limits,
        }
    }

    /// Configured limits
    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Look up an entry
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    /// Insert an entry, evicting a batch first if the cache is full
    ///
    /// Replacing an existing key keeps its position and never evicts.
    /// Returns the number of entries evicted.
    pub fn insert(&mut self, key: K, value: V) -> usize {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return 0;
        }

        let evicted = if self.entries.len() >= self.limits.max_size {
            self.evict_oldest(self.limits.eviction_batch_size.max(1))
        } else {
            0
        };

        self.entries.insert(key, value);
        evicted
    }

    /// Remove an entry, preserving the order of the rest
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.shift_remove(key)
    }

    /// Remove the `n` earliest-inserted entries. Returns how many were removed.
    pub fn evict_oldest(&mut self, n: usize) -> usize {
        let n = n.min(self.entries.len());
        self.entries.drain(..n);
        n
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether a key is present
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Keep only the entries matching a predicate, preserving order
    pub fn retain(&mut self, keep: impl FnMut(&K, &mut V) -> bool) {
        self.entries.retain(keep);
    }
}

/// Hit/miss counters shared by both tiers
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn evicted(&self, n: usize) {
        if n > 0 {
            self.evictions.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    fn snapshot(&self, len: usize) -> CacheStats {
        CacheStats {
            len,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time statistics for one cache tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    /// Current number of entries
    pub len: usize,
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that fell through
    pub misses: u64,
    /// Entries removed by high-water-mark eviction
    pub evictions: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    claims: Arc<SessionClaims>,
    expires_at: Instant,
}

/// Verified-token cache
///
/// An entry lives for the configured TTL, but never past the token's own
/// `exp`: a hit can therefore never serve an expired token.
#[derive(Debug)]
pub struct TokenCache {
    inner: Mutex<HighWaterCache<String, CachedToken>>,
    ttl: Duration,
    counters: Counters,
}

impl TokenCache {
    /// Create an empty cache
    #[must_use]
    pub fn new(ttl: Duration, limits: CacheLimits) -> Self {
        Self {
            inner: Mutex::new(HighWaterCache::new(limits)),
            ttl,
            counters: Counters::default(),
        }
    }

    /// Configured entry TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a token, purging it if its entry has lapsed
    pub fn get(&self, token: &str) -> Option<Arc<SessionClaims>> {
        self.get_at(token, Instant::now())
    }

    pub(crate) fn get_at(&self, token: &str, now: Instant) -> Option<Arc<SessionClaims>> {
        let mut cache = self.inner.lock();
        let state = cache
            .get(token)
            .map(|entry| (entry.expires_at > now, Arc::clone(&entry.claims)));

        let found = match state {
            Some((true, claims)) => Some(claims),
            Some((false, _)) => {
                cache.remove(token);
                debug!("Token cache entry lapsed");
                None
            }
            None => None,
        };
        drop(cache);

        match found {
            Some(_) => self.counters.hit(),
            None => self.counters.miss(),
        }
        found
    }

    /// Cache a verified token
    pub fn insert(&self, token: &str, claims: Arc<SessionClaims>) {
        self.insert_at(token, claims, Instant::now());
    }

    pub(crate) fn insert_at(&self, token: &str, claims: Arc<SessionClaims>, now: Instant) {
        let remaining = u64::try_from(claims.exp.saturating_sub(Utc::now().timestamp())).unwrap_or(0);
        let lifetime = self.ttl.min(Duration::from_secs(remaining));
        if lifetime.is_zero() {
            return;
        }

        let entry = CachedToken {
            claims,
            expires_at: now + lifetime,
        };

        let evicted = self.inner.lock().insert(token.to_string(), entry);
        if evicted > 0 {
            debug!(evicted, "Token cache reached high water mark");
        }
        self.counters.evicted(evicted);
    }

    /// Drop a token from the cache
    pub fn remove(&self, token: &str) -> bool {
        self.inner.lock().remove(token).is_some()
    }

    /// Number of cached tokens, including lapsed entries not yet purged
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Whether a token has an entry, lapsed or not
    pub fn contains(&self, token: &str) -> bool {
        self.inner.lock().contains_key(token)
    }

    /// Remove everything
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }
}

/// Key of the authorization cache
///
/// The key carries no record of where the route list came from. A decision
/// cached for a token whose `routes` claim differs from the stored user's
/// routes is served to that user's header logins too, and the reverse.
/// Call [`AuthzCache::invalidate_user`] when either list changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthzKey {
    /// Authenticated username
    pub username: String,
    /// `host + path` of the request
    pub target: String,
}

impl AuthzKey {
    /// Create a key
    pub fn new(username: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            target: target.into(),
        }
    }
}

/// Resolved-authorization cache
///
/// Entries have no TTL. They are only ever read after the identity has been
/// re-established in the same request.
#[derive(Debug)]
pub struct AuthzCache {
    inner: Mutex<HighWaterCache<AuthzKey, RouteDecision>>,
    counters: Counters,
}

impl AuthzCache {
    /// Create an empty cache
    #[must_use]
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            inner: Mutex::new(HighWaterCache::new(limits)),
            counters: Counters::default(),
        }
    }

    /// Look up a decision
    pub fn get(&self, key: &AuthzKey) -> Option<RouteDecision> {
        let found = self.inner.lock().get(key).cloned();
        match found {
            Some(_) => self.counters.hit(),
            None => self.counters.miss(),
        }
        found
    }

    /// Cache a decision
    pub fn insert(&self, key: AuthzKey, decision: RouteDecision) {
        let evicted = self.inner.lock().insert(key, decision);
        if evicted > 0 {
            debug!(evicted, "Authorization cache reached high water mark");
        }
        self.counters.evicted(evicted);
    }

    /// Drop every cached decision for a user
    pub fn invalidate_user(&self, username: &str) -> usize {
        let mut cache = self.inner.lock();
        let before = cache.len();
        cache.retain(|key, _| key.username != username);
        before - cache.len()
    }

    /// Number of cached decisions
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Remove everything
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }
}
