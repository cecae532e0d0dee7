//! Per-signer nonce allocation.
//!
//! # Data Flow
//! ```text
//! next_nonce(network, address)
//!     → with_lock("<prefix>.tx.nonce.<address>:<network>")
//!         miss → adapter.transaction_count(address) → store as-is → return it
//!         hit  → cached + 1 → store → return it
//! ```
//!
//! A miss returns the chain value unchanged because the mined transaction
//! count already is the next usable nonce. A hit increments because the cached
//! value was handed out last time. Changing either side breaks the first
//! allocation after a cold cache.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use thiserror::Error;

use crate::cache::{with_lock, CacheError, CacheStore, LockOptions};
use crate::chain::adapter::ChainAdapter;
use crate::chain::types::{ChainError, NetworkId};
use crate::config::schema::NonceConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Error)]
pub enum NonceError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to read nonce from chain: {0}")]
    Chain(#[from] ChainError),

    #[error("corrupt cached nonce '{0}'")]
    Corrupt(String),
}

/// Hands out strictly increasing nonces per (network, address).
pub struct NonceAllocator {
    cache: Arc<dyn CacheStore>,
    prefix: String,
    ttl: Duration,
    lock: LockOptions,
}

impl NonceAllocator {
    pub fn new(cache: Arc<dyn CacheStore>, prefix: impl Into<String>, config: &NonceConfig) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            ttl: Duration::from_secs(config.ttl_secs),
            lock: LockOptions {
                ttl: Duration::from_millis(config.lock_ttl_ms),
                wait: Duration::from_millis(config.lock_wait_ms),
                ..LockOptions::default()
            },
        }
    }

    /// Cache key for one signer on one network.
    pub fn key(&self, network: &NetworkId, address: Address) -> String {
        format!("{}.tx.nonce.{:#x}:{}", self.prefix, address, network)
    }

    pub async fn next_nonce(
        &self,
        network: &NetworkId,
        address: Address,
        adapter: &dyn ChainAdapter,
    ) -> Result<u64, NonceError> {
        let key = self.key(network, address);

        with_lock(self.cache.as_ref(), &key, self.lock, || async {
            let nonce = match self.cache.get(&key).await? {
                None => {
                    let floor = adapter.transaction_count(address).await?;
                    metrics::record_nonce_allocation("chain");
                    floor
                }
                Some(cached) => {
                    let last: u64 = cached
                        .trim()
                        .parse()
                        .map_err(|_| NonceError::Corrupt(cached.clone()))?;
                    metrics::record_nonce_allocation("cache");
                    last + 1
                }
            };

            self.cache.set(&key, &nonce.to_string(), self.ttl).await?;
            tracing::debug!(network_id = %network, address = %address, nonce = nonce, "Nonce allocated");
            Ok::<_, NonceError>(nonce)
        })
        .await
    }
}
