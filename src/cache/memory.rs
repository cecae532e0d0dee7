//! In-process cache backed by a `DashMap` with per-entry expiry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::{CacheError, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Writes between sweeps of expired entries.
const SWEEP_EVERY: u64 = 64;

/// Single-process cache. Expired entries are dropped on access and swept
/// every `SWEEP_EVERY` writes, so keys that are never read again do not pile up.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    writes: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry count.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&self) {
        self.entries.retain(|_, e| e.is_live());
    }

    #[cfg(test)]
    fn stored(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live() {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, e| !e.is_live());
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.sweep();
        }
        Ok(())
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, CacheError> {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut held) => {
                if held.get().is_live() {
                    return Ok(false);
                }
                held.insert(Entry::new(token, ttl));
                Ok(true)
            }
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::new(token, ttl));
                Ok(true)
            }
        }
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<(), CacheError> {
        self.entries.remove_if(key, |_, e| e.value == token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_writes_sweep_unread_expired_keys() {
        let cache = MemoryCache::new();
        for i in 0..10 {
            cache
                .set(&format!("idle:{}", i), "1", Duration::from_millis(10))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        for _ in 0..SWEEP_EVERY {
            cache.set("busy", "1", Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(cache.stored(), 1);
        assert_eq!(cache.get("busy").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_unlock_requires_owner_token() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(5);
        assert!(cache.try_lock("lock:x", "t1", ttl).await.unwrap());
        assert!(!cache.try_lock("lock:x", "t2", ttl).await.unwrap());

        cache.unlock("lock:x", "t2").await.unwrap();
        assert!(!cache.try_lock("lock:x", "t2", ttl).await.unwrap());

        cache.unlock("lock:x", "t1").await.unwrap();
        assert!(cache.try_lock("lock:x", "t2", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_taken() {
        let cache = MemoryCache::new();
        assert!(cache
            .try_lock("lock:y", "t1", Duration::from_millis(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache
            .try_lock("lock:y", "t2", Duration::from_secs(1))
            .await
            .unwrap());
    }
}
