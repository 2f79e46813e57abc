//! In-process cache backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::cache::{CacheError, Expiry, ResponseCache};

/// Longest lifetime an entry is given, whatever the caller asked for.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A stored value and the instant it stops being served.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A thread-safe in-memory cache. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.inner.retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let expired = match self.inner.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.inner.remove_if(key, |_, entry| !entry.is_live(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, expiry: Expiry) -> Result<(), CacheError> {
        let ttl = expiry.ttl_from(Utc::now());
        if ttl.is_zero() {
            tracing::debug!(key = %key, "Skipping cache write for already-expired entry");
            return Ok(());
        }
        if ttl > MAX_TTL {
            tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Capping cache TTL");
        }
        let now = Instant::now();
        let expires_at = now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now);
        self.inner.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = MemoryCache::new();
        assert!(cache.get("a").await.unwrap().is_none());

        cache
            .set("a", "1".into(), Expiry::Relative(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));

        // Last write wins
        cache
            .set("a", "2".into(), Expiry::Relative(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("2"));

        cache.remove("a").await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("short", "v".into(), Expiry::Relative(Duration::from_millis(30)))
            .await
            .unwrap();
        assert!(cache.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("short").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_past_absolute_expiry_is_not_stored() {
        let cache = MemoryCache::new();
        let past = Utc::now() - chrono::Duration::minutes(1);
        cache.set("old", "v".into(), Expiry::Absolute(past)).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache
            .set("gone", "v".into(), Expiry::Relative(Duration::from_millis(10)))
            .await
            .unwrap();
        cache
            .set("kept", "v".into(), Expiry::Relative(Duration::from_secs(60)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        cache.purge_expired();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_is_capped() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".into(), Expiry::Relative(Duration::from_secs(u64::MAX)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        let entry = cache.inner.get("k").unwrap();
        assert!(entry.expires_at <= Instant::now() + MAX_TTL);
    }
}
