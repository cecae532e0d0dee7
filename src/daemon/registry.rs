//! Process-wide supervisor: at most one daemon per network.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::cache::CacheError;
use crate::chain::types::{ChainError, NetworkId};
use crate::config::schema::NetworkConfig;
use crate::daemon::monitor::{self, DaemonDeps, DaemonHandle};
use crate::daemon::status::{Ingestor, NetworkStatus};

#[derive(Debug, Clone, Error)]
pub enum DaemonError {
    #[error("no daemon for network {0}")]
    NotFound(NetworkId),

    #[error(transparent)]
    Chain(ChainError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("corrupt cached status: {0}")]
    Decode(String),
}

impl From<ChainError> for DaemonError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::UnknownNetwork(id) => DaemonError::NotFound(id),
            other => DaemonError::Chain(other),
        }
    }
}

pub struct DaemonRegistry {
    daemons: Mutex<HashMap<NetworkId, DaemonHandle>>,
    deps: DaemonDeps,
}

impl DaemonRegistry {
    pub fn new(deps: DaemonDeps) -> Self {
        Self {
            daemons: Mutex::new(HashMap::new()),
            deps,
        }
    }

    fn daemons(&self) -> MutexGuard<'_, HashMap<NetworkId, DaemonHandle>> {
        self.daemons.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the daemon for `network`, starting one if none is registered.
    pub fn require(&self, network: &NetworkConfig) -> DaemonHandle {
        let mut daemons = self.daemons();
        if let Some(handle) = daemons.get(&network.id) {
            return handle.clone();
        }

        let handle = monitor::spawn(network, self.deps.clone());
        daemons.insert(network.id.clone(), handle.clone());
        tracing::info!(network_id = %network.id, name = %network.name, "Daemon registered");
        handle
    }

    /// Stop and forget the daemon for `network`.
    pub fn evict(&self, network: &NetworkId) -> Result<(), DaemonError> {
        let handle = self
            .daemons()
            .remove(network)
            .ok_or_else(|| DaemonError::NotFound(network.clone()))?;
        handle.shutdown();
        tracing::info!(network_id = %network, "Daemon evicted");
        Ok(())
    }

    pub fn get(&self, network: &NetworkId) -> Option<DaemonHandle> {
        self.daemons().get(network).cloned()
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.daemons().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.daemons().len()
    }

    pub fn is_empty(&self) -> bool {
        self.daemons().is_empty()
    }

    /// Current status of `network`.
    ///
    /// With `force`, one header is read straight from the chain. Otherwise the
    /// live daemon's snapshot is used, then the cached `status:<network>` entry.
    pub async fn status(&self, network: &NetworkId, force: bool) -> Result<NetworkStatus, DaemonError> {
        let live = self.get(network);

        if force {
            let base = live
                .as_ref()
                .map(|h| NetworkStatus::new(h.status().chain_id))
                .unwrap_or_default();
            let adapter = self.deps.adapters.adapter(network)?;
            let header = adapter.block_header().await?;

            let mut ingestor = Ingestor::new(
                network.clone(),
                base,
                self.deps.config.max_recent_blocks,
                self.deps.config.min_recent_blocks,
            );
            ingestor.apply(&header);
            let mut status = ingestor.status().clone();
            if status.chain_id.is_empty() {
                status.chain_id = adapter.chain_id().await?;
            }
            status.state = live.map(|h| h.state().as_str().to_string());
            return Ok(status);
        }

        if let Some(handle) = live {
            return Ok(handle.status());
        }

        match self.deps.cache.get(&format!("status:{}", network)).await? {
            Some(json) => serde_json::from_str(&json).map_err(|e| DaemonError::Decode(e.to_string())),
            None => Err(DaemonError::NotFound(network.clone())),
        }
    }

    /// Evict every daemon.
    pub fn shutdown_all(&self) {
        let drained: Vec<_> = self.daemons().drain().collect();
        for (network_id, handle) in drained {
            handle.shutdown();
            tracing::debug!(network_id = %network_id, "Daemon evicted on shutdown");
        }
    }
}
