//! Ethereum-family adapter.
//!
//! # Responsibilities
//! - Typed point queries through an alloy provider (chain id, nonce, receipts, gas price)
//! - Raw JSON-RPC for headers, calls and traces
//! - `eth_subscribe newHeads` streaming
//! - Legacy EIP-155 signing with a local key

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::eips::BlockId;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::chain::adapter::{ChainAdapter, HeaderStream};
use crate::chain::rpc::{parse_quantity, str_field, JsonRpcClient, METHOD_NOT_FOUND};
use crate::chain::stream::{self, FrameDecoder};
use crate::chain::types::{
    Capability, ChainError, ChainFamily, ChainResult, EthereumHeader, HeaderEvent, Receipt,
    SignedTx, TxParams,
};
use crate::chain::wallet::Wallet;
use crate::resilience::timeouts::with_timeout;

/// Adapter for Ethereum-compatible networks.
pub struct EthereumAdapter {
    provider: Option<Arc<dyn Provider + Send + Sync>>,
    rpc: Option<JsonRpcClient>,
    websocket_url: Option<String>,
    timeout_duration: Duration,
    gas_price_multiplier: f64,
}

impl EthereumAdapter {
    pub fn new(
        rpc_url: Option<&str>,
        websocket_url: Option<&str>,
        timeout_secs: u64,
        gas_price_multiplier: f64,
    ) -> ChainResult<Self> {
        let (provider, rpc) = match rpc_url {
            Some(url) => {
                let parsed: url::Url = url.parse().map_err(|e| {
                    ChainError::Transport(format!("Invalid RPC URL '{}': {}", url, e))
                })?;
                let provider = Arc::new(ProviderBuilder::new().connect_http(parsed))
                    as Arc<dyn Provider + Send + Sync>;
                (Some(provider), Some(JsonRpcClient::new(url, timeout_secs)?))
            }
            None => (None, None),
        };

        Ok(Self {
            provider,
            rpc,
            websocket_url: websocket_url.map(str::to_string),
            timeout_duration: Duration::from_secs(timeout_secs),
            gas_price_multiplier,
        })
    }

    fn provider(&self) -> ChainResult<&(dyn Provider + Send + Sync)> {
        self.provider
            .as_deref()
            .ok_or(ChainError::Unsupported(Capability::JsonRpc))
    }

    fn rpc(&self) -> ChainResult<&JsonRpcClient> {
        self.rpc.as_ref().ok_or(ChainError::Unsupported(Capability::JsonRpc))
    }

    async fn gas_price(&self, requested: Option<u128>) -> ChainResult<u128> {
        if let Some(price) = requested {
            return Ok(price);
        }
        let price = with_timeout(self.timeout_duration, self.provider()?.get_gas_price())
            .await?
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok((price as f64 * self.gas_price_multiplier) as u128)
    }
}

/// Decode a header object as returned by `eth_getBlockByNumber` or `newHeads`.
pub fn decode_header(value: &Value) -> ChainResult<EthereumHeader> {
    Ok(EthereumHeader {
        number: parse_quantity(&value["number"])?,
        hash: str_field(value, "hash")?.to_string(),
        parent_hash: str_field(value, "parentHash")?.to_string(),
        timestamp: parse_quantity(&value["timestamp"])?,
    })
}

fn frame_decoder() -> FrameDecoder {
    Arc::new(|frame: &Value| {
        if frame.get("method").and_then(Value::as_str) != Some("eth_subscription") {
            return Ok(None);
        }
        let header = frame
            .pointer("/params/result")
            .ok_or_else(|| ChainError::Decode("subscription frame without result".to_string()))?;
        decode_header(header).map(|h| Some(HeaderEvent::Ethereum(h)))
    })
}

fn parse_hash(hash: &str) -> ChainResult<TxHash> {
    TxHash::from_str(hash).map_err(|e| ChainError::Decode(format!("bad tx hash '{}': {}", hash, e)))
}

#[async_trait]
impl ChainAdapter for EthereumAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Ethereum
    }

    fn rpc_url(&self) -> Option<&str> {
        self.rpc.as_ref().map(JsonRpcClient::url)
    }

    fn websocket_url(&self) -> Option<&str> {
        self.websocket_url.as_deref()
    }

    async fn dial_json_rpc(&self, method: &str, params: Value) -> ChainResult<Value> {
        self.rpc()?.call(method, params).await
    }

    async fn chain_id(&self) -> ChainResult<String> {
        let id = with_timeout(self.timeout_duration, self.provider()?.get_chain_id())
            .await?
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(id.to_string())
    }

    async fn block_header(&self) -> ChainResult<HeaderEvent> {
        let block = self
            .dial_json_rpc("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        if block.is_null() {
            return Err(ChainError::Decode("node returned no latest block".to_string()));
        }
        decode_header(&block).map(HeaderEvent::Ethereum)
    }

    async fn subscribe_headers(&self) -> ChainResult<HeaderStream> {
        let url = self
            .websocket_url
            .as_deref()
            .ok_or(ChainError::Unsupported(Capability::Websocket))?;
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["newHeads"],
        });
        stream::subscribe(url, request, frame_decoder()).await
    }

    async fn transaction_count(&self, address: Address) -> ChainResult<u64> {
        let fut = self
            .provider()?
            .get_transaction_count(address)
            .block_id(BlockId::latest());
        with_timeout(self.timeout_duration, fut)
            .await?
            .map_err(|e| ChainError::Transport(e.to_string()))
    }

    async fn tx_receipt(&self, hash: &str) -> ChainResult<Option<Receipt>> {
        let tx_hash = parse_hash(hash)?;
        let receipt = with_timeout(
            self.timeout_duration,
            self.provider()?.get_transaction_receipt(tx_hash),
        )
        .await?
        .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(receipt.map(|r| Receipt {
            tx_hash: r.transaction_hash.to_string(),
            block_number: r.block_number,
            block_hash: r.block_hash.map(|h| h.to_string()),
            success: r.status(),
            contract_address: r.contract_address,
            gas_used: r.gas_used,
        }))
    }

    async fn tx_trace(&self, hash: &str) -> ChainResult<Value> {
        let params = json!([hash, {"tracer": "callTracer"}]);
        match self.dial_json_rpc("debug_traceTransaction", params).await {
            Err(ChainError::Rpc { code, .. }) if code == METHOD_NOT_FOUND => {
                Err(ChainError::Unsupported(Capability::Trace))
            }
            other => other,
        }
    }

    async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes> {
        let params = json!([{"to": to.to_string(), "data": data.to_string()}, "latest"]);
        let result = self.dial_json_rpc("eth_call", params).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| ChainError::Decode(format!("eth_call returned {}", result)))?;
        alloy::hex::decode(hex)
            .map(Bytes::from)
            .map_err(|e| ChainError::Decode(format!("eth_call result: {}", e)))
    }

    async fn sign_tx(&self, wallet: &Wallet, params: &TxParams) -> ChainResult<SignedTx> {
        let gas_price = self.gas_price(params.gas_price).await?;

        let request = TransactionRequest::default()
            .with_from(wallet.address())
            .with_chain_id(params.chain_id)
            .with_nonce(params.nonce)
            .with_value(params.value)
            .with_input(params.data.clone())
            .with_gas_limit(params.gas)
            .with_gas_price(gas_price);
        let request = match params.to {
            Some(to) => request.with_to(to),
            None => request.into_create(),
        };

        let envelope = request
            .build(&wallet.network_wallet())
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        Ok(SignedTx {
            hash: envelope.tx_hash().to_string(),
            raw: Bytes::from(envelope.encoded_2718()),
        })
    }

    async fn broadcast_tx(&self, tx: &SignedTx) -> ChainResult<String> {
        let pending = with_timeout(
            self.timeout_duration,
            self.provider()?.send_raw_transaction(&tx.raw),
        )
        .await?
        .map_err(|e| ChainError::Broadcast(e.to_string()))?;
        Ok(pending.tx_hash().to_string())
    }
}

impl std::fmt::Debug for EthereumAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumAdapter")
            .field("rpc_url", &self.rpc_url())
            .field("websocket_url", &self.websocket_url)
            .field("timeout", &self.timeout_duration)
            .finish()
    }
}
