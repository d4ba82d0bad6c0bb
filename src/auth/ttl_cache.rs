//! TTL cache for per-request login verdicts
//!
//! Allow and deny verdicts live in separate partitions with separate TTLs.
//! Expiry is checked lazily on read; an expired entry is purged and reported
//! as a miss. Keys that are never read again are dropped by a sweep that
//! `set` runs at most once per shorter TTL. One mutex guards the whole
//! structure.

use crate::auth::decision::Verdict;
use crate::config::CacheConfig;
use ahash::AHashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Composite cache key for one login attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub proxy_ip: String,
    pub credentials: String,
    pub remote_ip: String,
}

impl CacheKey {
    pub fn new(
        proxy_ip: impl Into<String>,
        credentials: impl Into<String>,
        remote_ip: impl Into<String>,
    ) -> Self {
        Self {
            proxy_ip: proxy_ip.into(),
            credentials: credentials.into(),
            remote_ip: remote_ip.into(),
        }
    }
}

/// Counters for cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
}

#[derive(Debug)]
struct State {
    allowed: AHashMap<CacheKey, Instant>,
    denied: AHashMap<CacheKey, Instant>,
    stats: CacheStats,
    last_sweep: Instant,
}

impl State {
    fn purge(&mut self, now: Instant, allow_ttl: Duration, deny_ttl: Duration) -> usize {
        let before = self.allowed.len() + self.denied.len();
        self.allowed
            .retain(|_, inserted| now.duration_since(*inserted) <= allow_ttl);
        self.denied
            .retain(|_, inserted| now.duration_since(*inserted) <= deny_ttl);
        let removed = before - (self.allowed.len() + self.denied.len());

        self.stats.expirations += removed as u64;
        self.last_sweep = now;
        removed
    }
}

/// Verdict cache with independent allow and deny TTLs
#[derive(Debug)]
pub struct VerdictCache {
    inner: Mutex<State>,
    allow_ttl: Duration,
    deny_ttl: Duration,
}

impl VerdictCache {
    pub fn new(allow_ttl: Duration, deny_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(State {
                allowed: AHashMap::new(),
                denied: AHashMap::new(),
                stats: CacheStats::default(),
                last_sweep: Instant::now(),
            }),
            allow_ttl,
            deny_ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.allow_ttl(), config.deny_ttl())
    }

    /// Cached verdict for `key`, if present and not older than its TTL
    pub fn get(&self, key: &CacheKey) -> Option<Verdict> {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        for (verdict, map, ttl) in [
            (Verdict::Allow, &mut state.allowed, self.allow_ttl),
            (Verdict::Deny, &mut state.denied, self.deny_ttl),
        ] {
            if let Some(inserted) = map.get(key).copied() {
                if now.duration_since(inserted) > ttl {
                    map.remove(key);
                    state.stats.expirations += 1;
                    state.stats.misses += 1;
                    return None;
                }
                state.stats.hits += 1;
                return Some(verdict);
            }
        }

        state.stats.misses += 1;
        None
    }

    /// Store `verdict` for `key`, stamped with the current time
    pub fn set(&self, key: CacheKey, verdict: Verdict) {
        let now = Instant::now();
        let mut state = self.lock();

        if now.duration_since(state.last_sweep) >= self.sweep_interval() {
            let removed = state.purge(now, self.allow_ttl, self.deny_ttl);
            if removed > 0 {
                debug!("Swept {} expired verdicts", removed);
            }
        }

        match verdict {
            Verdict::Allow => {
                state.denied.remove(&key);
                state.allowed.insert(key, now);
            }
            Verdict::Deny => {
                state.allowed.remove(&key);
                state.denied.insert(key, now);
            }
        }
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        self.lock().purge(Instant::now(), self.allow_ttl, self.deny_ttl)
    }

    pub fn len(&self) -> usize {
        let state = self.lock();
        state.allowed.len() + state.denied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn sweep_interval(&self) -> Duration {
        self.allow_ttl.min(self.deny_ttl)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave the maps inconsistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::new("10.0.0.1", "u:p", "9.9.9.9")
    }

    fn cache() -> VerdictCache {
        VerdictCache::new(Duration::from_secs(720), Duration::from_secs(180))
    }

    #[tokio::test(start_paused = true)]
    async fn test_deny_entry_expires_after_180s() {
        let cache = cache();
        cache.set(key(), Verdict::Deny);

        tokio::time::advance(Duration::from_secs(180)).await;
        assert_eq!(cache.get(&key()), Some(Verdict::Deny));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&key()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_entry_expires_after_720s() {
        let cache = cache();
        cache.set(key(), Verdict::Allow);

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(cache.get(&key()), Some(Verdict::Allow));

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(cache.get(&key()), Some(Verdict::Allow));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_moves_key_between_partitions() {
        let cache = cache();
        cache.set(key(), Verdict::Deny);
        cache.set(key(), Verdict::Allow);

        assert_eq!(cache.len(), 1);
        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(cache.get(&key()), Some(Verdict::Allow));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_and_stats() {
        let cache = cache();
        cache.set(CacheKey::new("a", "u:p", "r"), Verdict::Deny);
        cache.set(CacheKey::new("b", "u:p", "r"), Verdict::Allow);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.get(&CacheKey::new("b", "u:p", "r")), Some(Verdict::Allow));
        assert_eq!(cache.get(&CacheKey::new("a", "u:p", "r")), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_sweeps_keys_never_read_again() {
        let cache = cache();
        for i in 0..100 {
            cache.set(CacheKey::new("10.0.0.1", format!("u{}:p", i), "9.9.9.9"), Verdict::Deny);
        }
        cache.set(CacheKey::new("10.0.0.1", "kept:p", "9.9.9.9"), Verdict::Allow);
        assert_eq!(cache.len(), 101);

        // Before the sweep interval nothing is dropped
        tokio::time::advance(Duration::from_secs(179)).await;
        cache.set(CacheKey::new("10.0.0.2", "a:b", "9.9.9.9"), Verdict::Deny);
        assert_eq!(cache.len(), 102);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set(CacheKey::new("10.0.0.3", "c:d", "9.9.9.9"), Verdict::Deny);

        // The 100 stale denies are gone; the allow and the two recent denies stay
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().expirations, 100);
        assert_eq!(
            cache.get(&CacheKey::new("10.0.0.1", "kept:p", "9.9.9.9")),
            Some(Verdict::Allow)
        );
    }
}
