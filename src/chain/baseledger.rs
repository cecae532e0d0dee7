//! Baseledger (Tendermint) adapter.
//!
//! `NewBlockHeader` events carry no block hash, so each streamed header is
//! completed with a `block` lookup at its height before it leaves the adapter.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::chain::adapter::{ChainAdapter, HeaderStream};
use crate::chain::rpc::{parse_decimal, str_field, JsonRpcClient};
use crate::chain::stream::{self, FrameDecoder};
use crate::chain::types::{
    BaseledgerHeader, Capability, ChainError, ChainFamily, ChainResult, HeaderEvent, Receipt,
    SignedTx,
};

const NEW_BLOCK_HEADER_QUERY: &str = "tm.event='NewBlockHeader'";

#[derive(Debug)]
pub struct BaseledgerAdapter {
    rpc: Arc<JsonRpcClient>,
    websocket_url: Option<String>,
}

impl BaseledgerAdapter {
    pub fn new(rpc_url: &str, websocket_url: Option<&str>, timeout_secs: u64) -> ChainResult<Self> {
        Ok(Self {
            rpc: Arc::new(JsonRpcClient::new(rpc_url, timeout_secs)?),
            websocket_url: websocket_url.map(str::to_string),
        })
    }
}

/// Parse a Tendermint RFC 3339 block time into seconds since epoch.
pub fn parse_block_time(value: &Value) -> ChainResult<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected block time, got {}", value)))?;
    let time = chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| ChainError::Decode(format!("bad block time '{}': {}", s, e)))?;
    u64::try_from(time.timestamp())
        .map_err(|_| ChainError::Decode(format!("block time before epoch: {}", s)))
}

fn decode_header_fields(header: &Value, hash: &str) -> ChainResult<BaseledgerHeader> {
    Ok(BaseledgerHeader {
        height: parse_decimal(&header["height"])?,
        hash: hash.to_string(),
        chain_id: str_field(header, "chain_id")?.to_string(),
        time: parse_block_time(&header["time"])?,
    })
}

/// Decode a `block` RPC result.
pub fn decode_block(result: &Value) -> ChainResult<BaseledgerHeader> {
    let hash = result
        .pointer("/block_id/hash")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::Decode("block result without block_id.hash".to_string()))?;
    let header = result
        .pointer("/block/header")
        .ok_or_else(|| ChainError::Decode("block result without header".to_string()))?;
    decode_header_fields(header, hash)
}

fn frame_decoder() -> FrameDecoder {
    Arc::new(|frame: &Value| {
        let Some(header) = frame.pointer("/result/data/value/header") else {
            return Ok(None);
        };
        decode_header_fields(header, "").map(|h| Some(HeaderEvent::Baseledger(h)))
    })
}

async fn block_at(rpc: &JsonRpcClient, height: Option<u64>) -> ChainResult<BaseledgerHeader> {
    let params = match height {
        Some(h) => json!({ "height": h.to_string() }),
        None => json!({}),
    };
    let result = rpc.call("block", params).await?;
    decode_block(&result)
}

#[async_trait]
impl ChainAdapter for BaseledgerAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Baseledger
    }

    fn rpc_url(&self) -> Option<&str> {
        Some(self.rpc.url())
    }

    fn websocket_url(&self) -> Option<&str> {
        self.websocket_url.as_deref()
    }

    async fn dial_json_rpc(&self, method: &str, params: Value) -> ChainResult<Value> {
        self.rpc.call(method, params).await
    }

    async fn chain_id(&self) -> ChainResult<String> {
        let status = self.rpc.call("status", json!({})).await?;
        status
            .pointer("/node_info/network")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChainError::Decode("status without node_info.network".to_string()))
    }

    async fn block_header(&self) -> ChainResult<HeaderEvent> {
        block_at(&self.rpc, None).await.map(HeaderEvent::Baseledger)
    }

    async fn subscribe_headers(&self) -> ChainResult<HeaderStream> {
        let url = self
            .websocket_url
            .as_deref()
            .ok_or(ChainError::Unsupported(Capability::Websocket))?;
        let request = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "subscribe",
            "params": { "query": NEW_BLOCK_HEADER_QUERY },
        });
        let headers = stream::subscribe(url, request, frame_decoder()).await?;

        let rpc = self.rpc.clone();
        let completed = headers.then(move |item| {
            let rpc = rpc.clone();
            async move {
                match item {
                    Ok(HeaderEvent::Baseledger(h)) if h.hash.is_empty() => block_at(&rpc, Some(h.height))
                        .await
                        .map(HeaderEvent::Baseledger)
                        .map_err(|e| ChainError::Decode(format!("block {} lookup: {}", h.height, e))),
                    other => other,
                }
            }
        });
        Ok(completed.boxed())
    }

    async fn tx_receipt(&self, hash: &str) -> ChainResult<Option<Receipt>> {
        let query = [("hash", format!("0x{}", hash.trim_start_matches("0x")))];
        let result = match self.rpc.get("tx", &query).await {
            Ok(r) => r,
            Err(ChainError::Rpc { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let code = result.pointer("/tx_result/code").and_then(Value::as_u64).unwrap_or(0);
        let gas_used = result
            .pointer("/tx_result/gas_used")
            .map(parse_decimal)
            .transpose()?
            .unwrap_or(0);

        Ok(Some(Receipt {
            tx_hash: hash.to_string(),
            block_number: Some(parse_decimal(&result["height"])?),
            block_hash: None,
            success: code == 0,
            contract_address: None,
            gas_used,
        }))
    }

    async fn broadcast_tx(&self, tx: &SignedTx) -> ChainResult<String> {
        let query = [("tx", format!("0x{}", alloy::hex::encode(&tx.raw)))];
        let result = self
            .rpc
            .get("broadcast_tx_sync", &query)
            .await
            .map_err(|e| ChainError::Broadcast(e.to_string()))?;

        let code = result.get("code").and_then(Value::as_u64).unwrap_or(0);
        if code != 0 {
            let log = result.get("log").and_then(Value::as_str).unwrap_or("rejected");
            return Err(ChainError::Broadcast(log.to_string()));
        }
        Ok(str_field(&result, "hash")?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_block_result() {
        let header = decode_block(&json!({
            "block_id": {"hash": "6B1B6C1C0D5E4F3A2B1C0D9E8F7A6B5C4D3E2F1A0B9C8D7E6F5A4B3C2D1E0F9A"},
            "block": {
                "header": {
                    "chain_id": "baseledger",
                    "height": "1024",
                    "time": "2021-11-04T10:15:30.123456789Z"
                }
            }
        }))
        .unwrap();
        assert_eq!(header.height, 1024);
        assert_eq!(header.chain_id, "baseledger");
        assert_eq!(header.time, 1636020930);
        assert!(header.hash.starts_with("6B1B"));
    }

    #[test]
    fn test_new_block_header_event_needs_hash() {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "result": {
                "query": NEW_BLOCK_HEADER_QUERY,
                "data": {
                    "type": "tendermint/event/NewBlockHeader",
                    "value": {"header": {"chain_id": "baseledger", "height": "7", "time": "2021-11-04T10:15:30Z"}}
                }
            }
        });
        match frame_decoder()(&frame).unwrap() {
            Some(HeaderEvent::Baseledger(h)) => {
                assert_eq!(h.height, 7);
                assert!(h.hash.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_ack_is_skipped() {
        let ack = json!({"jsonrpc": "2.0", "id": 0, "result": {}});
        assert!(frame_decoder()(&ack).unwrap().is_none());
    }
}
