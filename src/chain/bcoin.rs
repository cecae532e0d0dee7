//! Bcoin (UTXO) adapter.
//!
//! Bcoin exposes no new-block subscription the daemon can consume, so
//! `subscribe_headers` reports `Unsupported(Websocket)` and the daemon polls.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::chain::adapter::{ChainAdapter, HeaderStream};
use crate::chain::rpc::{parse_decimal, str_field, JsonRpcClient};
use crate::chain::types::{
    BcoinHeader, Capability, ChainError, ChainFamily, ChainResult, HeaderEvent, Receipt, SignedTx,
};

#[derive(Debug)]
pub struct BcoinAdapter {
    rpc: JsonRpcClient,
}

impl BcoinAdapter {
    pub fn new(rpc_url: &str, timeout_secs: u64) -> ChainResult<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(rpc_url, timeout_secs)?,
        })
    }
}

/// Decode a verbose `getblockheader` result.
pub fn decode_header(value: &Value) -> ChainResult<BcoinHeader> {
    Ok(BcoinHeader {
        height: parse_decimal(&value["height"])?,
        hash: str_field(value, "hash")?.to_string(),
        merkle_root: str_field(value, "merkleroot")?.to_string(),
        time: parse_decimal(&value["time"])?,
    })
}

#[async_trait]
impl ChainAdapter for BcoinAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Bcoin
    }

    fn rpc_url(&self) -> Option<&str> {
        Some(self.rpc.url())
    }

    fn websocket_url(&self) -> Option<&str> {
        None
    }

    async fn dial_json_rpc(&self, method: &str, params: Value) -> ChainResult<Value> {
        self.rpc.call(method, params).await
    }

    async fn chain_id(&self) -> ChainResult<String> {
        let info = self.rpc.call("getblockchaininfo", json!([])).await?;
        Ok(str_field(&info, "chain")?.to_string())
    }

    async fn block_header(&self) -> ChainResult<HeaderEvent> {
        let best = self.rpc.call("getbestblockhash", json!([])).await?;
        let hash = best
            .as_str()
            .ok_or_else(|| ChainError::Decode(format!("getbestblockhash returned {}", best)))?;
        let header = self.rpc.call("getblockheader", json!([hash, true])).await?;
        decode_header(&header).map(HeaderEvent::Bcoin)
    }

    async fn subscribe_headers(&self) -> ChainResult<HeaderStream> {
        Err(ChainError::Unsupported(Capability::Websocket))
    }

    async fn tx_receipt(&self, hash: &str) -> ChainResult<Option<Receipt>> {
        let tx = match self.rpc.call("getrawtransaction", json!([hash, true])).await {
            Ok(tx) if tx.is_null() => return Ok(None),
            Ok(tx) => tx,
            Err(ChainError::Rpc { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(block_hash) = tx.get("blockhash").and_then(Value::as_str) else {
            return Ok(None);
        };
        let block = self.rpc.call("getblockheader", json!([block_hash, true])).await?;

        Ok(Some(Receipt {
            tx_hash: hash.to_string(),
            block_number: Some(parse_decimal(&block["height"])?),
            block_hash: Some(block_hash.to_string()),
            success: true,
            contract_address: None,
            gas_used: 0,
        }))
    }

    async fn broadcast_tx(&self, tx: &SignedTx) -> ChainResult<String> {
        let raw = alloy::hex::encode(&tx.raw);
        let hash = self
            .rpc
            .call("sendrawtransaction", json!([raw]))
            .await
            .map_err(|e| ChainError::Broadcast(e.to_string()))?;
        hash.as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::Decode(format!("sendrawtransaction returned {}", hash)))
    }
}
