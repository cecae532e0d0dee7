//! The capability set every chain family implements.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::chain::types::{
    Capability, ChainError, ChainFamily, ChainResult, HeaderEvent, NetworkId, Receipt, SignedTx,
    TxParams,
};
use crate::chain::wallet::Wallet;

/// Live stream of normalized headers. Ends when the transport closes.
pub type HeaderStream = BoxStream<'static, ChainResult<HeaderEvent>>;

/// Chain-family capability set consumed by the status daemon and the
/// transaction pipeline.
///
/// Optional capabilities default to [`ChainError::Unsupported`], which callers
/// treat as a signal to change strategy rather than as a failure.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn family(&self) -> ChainFamily;

    fn is_ethereum_family(&self) -> bool {
        self.family() == ChainFamily::Ethereum
    }

    fn rpc_url(&self) -> Option<&str>;

    fn websocket_url(&self) -> Option<&str>;

    /// Raw JSON-RPC request against the network's HTTP endpoint.
    async fn dial_json_rpc(&self, method: &str, params: Value) -> ChainResult<Value>;

    async fn chain_id(&self) -> ChainResult<String>;

    /// Latest block header.
    async fn block_header(&self) -> ChainResult<HeaderEvent>;

    /// Open a new-block subscription.
    async fn subscribe_headers(&self) -> ChainResult<HeaderStream>;

    /// Nonce of the last mined transaction plus one (not the pending pool).
    async fn transaction_count(&self, _address: Address) -> ChainResult<u64> {
        Err(ChainError::Unsupported(Capability::Signing))
    }

    async fn tx_receipt(&self, hash: &str) -> ChainResult<Option<Receipt>>;

    /// VM execution trace for a mined transaction.
    async fn tx_trace(&self, _hash: &str) -> ChainResult<Value> {
        Err(ChainError::Unsupported(Capability::Trace))
    }

    /// Read-only contract call against the latest block.
    async fn call(&self, _to: Address, _data: Bytes) -> ChainResult<Bytes> {
        Err(ChainError::Unsupported(Capability::JsonRpc))
    }

    async fn sign_tx(&self, _wallet: &Wallet, _params: &TxParams) -> ChainResult<SignedTx> {
        Err(ChainError::Unsupported(Capability::Signing))
    }

    /// Submit a signed transaction, returning its hash.
    async fn broadcast_tx(&self, tx: &SignedTx) -> ChainResult<String>;
}

/// Hands out the adapter for a network.
pub trait AdapterSource: Send + Sync {
    fn adapter(&self, network: &NetworkId) -> ChainResult<Arc<dyn ChainAdapter>>;

    /// Drop any cached connection and rebuild it from current configuration.
    fn reload(&self, network: &NetworkId) -> ChainResult<Arc<dyn ChainAdapter>>;
}
