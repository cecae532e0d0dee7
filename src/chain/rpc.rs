//! JSON-RPC over HTTP, shared by every adapter for point queries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};

use crate::chain::types::{ChainError, ChainResult};

/// JSON-RPC error code for "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Minimal JSON-RPC 2.0 client with a per-request timeout.
#[derive(Debug)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: url::Url,
    timeout_secs: u64,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: &str, timeout_secs: u64) -> ChainResult<Self> {
        let url = url
            .parse()
            .map_err(|e| ChainError::Transport(format!("Invalid RPC URL '{}': {}", url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url,
            timeout_secs,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Issue one request and unwrap its `result`.
    pub async fn call(&self, method: &str, params: Value) -> ChainResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(method = method, id = id, "JSON-RPC request");

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if !response.status().is_success() {
            return Err(ChainError::Transport(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{} response: {}", method, e)))?;

        into_result(payload)
    }

    /// URI-style request (`GET <url>/<method>?k=v`), as served by Tendermint nodes.
    pub async fn get(&self, method: &str, query: &[(&str, String)]) -> ChainResult<Value> {
        let url = self
            .url
            .join(method)
            .map_err(|e| ChainError::Transport(format!("bad method path '{}': {}", method, e)))?;

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{} response: {}", method, e)))?;

        into_result(payload)
    }

    fn map_transport(&self, err: reqwest::Error) -> ChainError {
        if err.is_timeout() {
            ChainError::Timeout(self.timeout_secs)
        } else {
            ChainError::Transport(err.to_string())
        }
    }
}

/// Split a JSON-RPC response envelope into its result or error.
pub fn into_result(mut payload: Value) -> ChainResult<Value> {
    if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(ChainError::Rpc { code, message });
    }

    match payload.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(ChainError::Decode("response has neither result nor error".to_string())),
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &Value) -> ChainResult<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex quantity, got {}", value)))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Decode(format!("bad hex quantity '{}': {}", s, e)))
}

/// Parse a decimal quantity that may be encoded as a string (Tendermint) or a number.
pub fn parse_decimal(value: &Value) -> ChainResult<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ChainError::Decode(format!("expected unsigned integer, got {}", n))),
        Value::String(s) => s
            .parse()
            .map_err(|e| ChainError::Decode(format!("bad decimal '{}': {}", s, e))),
        other => Err(ChainError::Decode(format!("expected integer, got {}", other))),
    }
}

/// Read a string field.
pub fn str_field<'a>(value: &'a Value, field: &str) -> ChainResult<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::Decode(format!("missing field '{}'", field)))
}
