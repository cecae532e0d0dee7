//! One adapter per network, rebuilt on demand from the live configuration.

use std::sync::Arc;

use dashmap::DashMap;

use crate::chain::adapter::{AdapterSource, ChainAdapter};
use crate::chain::baseledger::BaseledgerAdapter;
use crate::chain::bcoin::BcoinAdapter;
use crate::chain::ethereum::EthereumAdapter;
use crate::chain::types::{Capability, ChainError, ChainFamily, ChainResult, NetworkId};
use crate::config::schema::{NetworkConfig, RpcConfig};
use crate::config::SharedConfig;

/// Build the adapter for a network record.
pub fn build_adapter(network: &NetworkConfig, rpc: &RpcConfig) -> ChainResult<Arc<dyn ChainAdapter>> {
    let rpc_url = network.rpc_url.as_deref();
    let websocket_url = network.websocket_url.as_deref();

    let adapter: Arc<dyn ChainAdapter> = match network.family {
        ChainFamily::Ethereum => Arc::new(EthereumAdapter::new(
            rpc_url,
            websocket_url,
            rpc.timeout_secs,
            rpc.gas_price_multiplier,
        )?),
        ChainFamily::Bcoin => {
            let url = rpc_url.ok_or(ChainError::Unsupported(Capability::JsonRpc))?;
            Arc::new(BcoinAdapter::new(url, rpc.timeout_secs)?)
        }
        ChainFamily::Baseledger => {
            let url = rpc_url.ok_or(ChainError::Unsupported(Capability::JsonRpc))?;
            Arc::new(BaseledgerAdapter::new(url, websocket_url, rpc.timeout_secs)?)
        }
    };
    Ok(adapter)
}

/// Adapter cache keyed by network id.
pub struct AdapterCache {
    config: SharedConfig,
    adapters: DashMap<NetworkId, Arc<dyn ChainAdapter>>,
}

impl AdapterCache {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            adapters: DashMap::new(),
        }
    }

    fn build(&self, id: &NetworkId) -> ChainResult<Arc<dyn ChainAdapter>> {
        let config = self.config.load();
        let network = config
            .network(id)
            .ok_or_else(|| ChainError::UnknownNetwork(id.clone()))?;
        build_adapter(network, &config.rpc)
    }

    /// Number of live adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl AdapterSource for AdapterCache {
    fn adapter(&self, network: &NetworkId) -> ChainResult<Arc<dyn ChainAdapter>> {
        if let Some(adapter) = self.adapters.get(network) {
            return Ok(adapter.value().clone());
        }
        let adapter = self.build(network)?;
        Ok(self
            .adapters
            .entry(network.clone())
            .or_insert(adapter)
            .value()
            .clone())
    }

    fn reload(&self, network: &NetworkId) -> ChainResult<Arc<dyn ChainAdapter>> {
        let adapter = self.build(network)?;
        self.adapters.insert(network.clone(), adapter.clone());
        tracing::info!(network_id = %network, "Chain adapter reloaded");
        Ok(adapter)
    }
}
