//! Keyed cache store and distributed lock.
//!
//! # Data Flow
//! ```text
//! daemon  → set("status:<network>", snapshot, 60 min)
//! nonce   → with_lock("<prefix>.tx.nonce.<address>:<network>")
//!              → get / set (5s TTL)
//! registry → get("status:<network>") when no live daemon exists
//! ```
//!
//! Two backends: [`MemoryCache`] for a single process and [`RedisCache`]
//! when several instances share nonce state.

pub mod memory;
pub mod redis;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

use crate::config::schema::{Backend, CacheConfig};

/// Errors from the cache backend.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    /// The lock stayed held by someone else for the whole wait window.
    #[error("timed out waiting for lock on '{0}'")]
    LockTimeout(String),
}

/// String-valued cache with TTLs and token-guarded locks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Take the lock if free. Returns `false` when another token holds it.
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Release the lock only if `token` still owns it.
    async fn unlock(&self, key: &str, token: &str) -> Result<(), CacheError>;
}

/// How long a lock lives and how long to wait for it.
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    pub ttl: Duration,
    pub wait: Duration,
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            wait: Duration::from_secs(10),
            retry_interval: Duration::from_millis(10),
        }
    }
}

/// Run `f` while holding the distributed lock for `key`.
///
/// The lock is released on every exit path of `f`. A failed release is only
/// logged; the lock TTL bounds how long it can linger.
pub async fn with_lock<F, Fut, T, E>(
    store: &dyn CacheStore,
    key: &str,
    options: LockOptions,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<CacheError>,
{
    let lock_key = format!("lock:{}", key);
    let token = uuid::Uuid::new_v4().to_string();
    let deadline = tokio::time::Instant::now() + options.wait;

    loop {
        if store.try_lock(&lock_key, &token, options.ttl).await? {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CacheError::LockTimeout(key.to_string()).into());
        }
        tokio::time::sleep(options.retry_interval).await;
    }

    let result = f().await;

    if let Err(e) = store.unlock(&lock_key, &token).await {
        tracing::warn!(key = %key, error = %e, "Failed to release lock");
    }
    result
}

/// Build the configured backend.
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    match config.backend {
        Backend::Memory => Ok(Arc::new(MemoryCache::new())),
        Backend::Redis => Ok(Arc::new(RedisCache::connect(&config.redis_url).await?)),
    }
}
