//! In-memory cache implementation using moka
//!
//! Values are stored as JSON so one cache can hold any serialisable type.
//! Every entry lives for the cache's configured TTL; writes elsewhere in the
//! application invalidate affected keys by glob pattern.

use anyhow::{Context, Result};
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum cache capacity (number of entries)
const DEFAULT_MAX_CAPACITY: u64 = 1_000;

/// Default TTL for cache entries (5 minutes)
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// JSON-serialized value
#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    ttl: Duration,
    enabled: bool,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    /// A capacity of zero keeps nothing, which turns caching off.
    pub fn with_capacity_and_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            ttl,
            enabled: max_capacity > 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Returns `Ok(None)` if the key is absent or expired.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if !self.enabled {
            return Ok(None);
        }
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let entry = CacheEntry::new(value)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    /// Cache-aside lookup: return the cached value or load, store and
    /// return a fresh one.
    pub async fn get_or_load<T, F, Fut, E>(&self, key: &str, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get::<T>(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => tracing::warn!("Discarding unreadable cache entry {}: {:#}", key, e),
        }

        let value = load().await?;
        if let Err(e) = self.set(key, &value).await {
            tracing::warn!("Failed to cache {}: {:#}", key, e);
        }
        Ok(value)
    }

    pub async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Delete all values matching a glob-style pattern (`*` and `?`).
    pub async fn delete_pattern(&self, pattern: &str) {
        let keys_to_delete: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys_to_delete {
            self.cache.invalidate(&key).await;
        }
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern_chars: Vec<char> = pattern.chars().collect();
        let key_chars: Vec<char> = key.chars().collect();
        Self::glob_match(&pattern_chars, &key_chars, 0, 0)
    }

    fn glob_match(pattern: &[char], key: &[char], pi: usize, ki: usize) -> bool {
        if pi == pattern.len() {
            return ki == key.len();
        }

        match pattern[pi] {
            '*' => {
                Self::glob_match(pattern, key, pi + 1, ki)
                    || (ki < key.len() && Self::glob_match(pattern, key, pi, ki + 1))
            }
            '?' => ki < key.len() && Self::glob_match(pattern, key, pi + 1, ki + 1),
            p => ki < key.len() && key[ki] == p && Self::glob_match(pattern, key, pi + 1, ki + 1),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set("key1", &"value1".to_string()).await.unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));

        let missing: Option<String> = cache.get("nope").await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_millis(10));
        cache.set("k", &1u32).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.cache.run_pending_tasks().await;

        let result: Option<u32> = cache.get("k").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_get_or_load_only_loads_once() {
        let cache = MemoryCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<Vec<i64>, anyhow::Error> = cache
                .get_or_load("posts:latest", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![3, 2, 1])
                })
                .await;
            assert_eq!(value.unwrap(), vec![3, 2, 1]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_load_does_not_cache_errors() {
        let cache = MemoryCache::new();
        let failed: Result<u32, String> = cache.get_or_load("k", || async { Err("boom".to_string()) }).await;
        assert!(failed.is_err());

        let loaded: Result<u32, String> = cache.get_or_load("k", || async { Ok(7) }).await;
        assert_eq!(loaded.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = MemoryCache::new();
        cache.set("posts:home", &"a".to_string()).await.unwrap();
        cache.set("posts:sidebar", &"b".to_string()).await.unwrap();
        cache.set("users:1", &"c".to_string()).await.unwrap();

        cache.delete_pattern("posts:*").await;

        let home: Option<String> = cache.get("posts:home").await.unwrap();
        let user: Option<String> = cache.get("users:1").await.unwrap();
        assert_eq!(home, None);
        assert_eq!(user, Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_nothing() {
        let cache = MemoryCache::with_capacity_and_ttl(0, DEFAULT_TTL);
        cache.set("k", &1u32).await.unwrap();

        let result: Option<u32> = cache.get("k").await.unwrap();
        assert_eq!(result, None);
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        cache.set("key1", &"value1".to_string()).await.unwrap();
        cache.clear().await;

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("posts:*", "posts:123"));
        assert!(MemoryCache::pattern_matches("posts:*", "posts:"));
        assert!(MemoryCache::pattern_matches("*:123", "posts:123"));
        assert!(!MemoryCache::pattern_matches("posts:*", "users:123"));

        assert!(MemoryCache::pattern_matches("user:?:profile", "user:1:profile"));
        assert!(!MemoryCache::pattern_matches("user:?:profile", "user:10:profile"));

        assert!(MemoryCache::pattern_matches("exact", "exact"));
        assert!(!MemoryCache::pattern_matches("exact", "exactx"));
    }
}
