//! Websocket block subscriptions.
//!
//! # Data Flow
//! ```text
//! connect_async(url)
//!     → send chain-specific subscribe request
//!     → every text/binary frame → JSON → family decoder
//!     → HeaderStream item (acks and keep-alives are skipped)
//! ```
//!
//! A frame that fails to decode yields `ChainError::Decode` and the stream
//! keeps going; a transport error ends it.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::chain::adapter::HeaderStream;
use crate::chain::rpc::METHOD_NOT_FOUND;
use crate::chain::types::{Capability, ChainError, ChainResult, HeaderEvent};

/// Turns one decoded JSON frame into a header, `None` for frames to skip.
pub type FrameDecoder = Arc<dyn Fn(&Value) -> ChainResult<Option<HeaderEvent>> + Send + Sync>;

/// Open a websocket, send `request`, and decode every subsequent frame.
pub async fn subscribe(url: &str, request: Value, decode: FrameDecoder) -> ChainResult<HeaderStream> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(map_connect_error)?;

    ws.send(Message::text(request.to_string()))
        .await
        .map_err(|e| ChainError::Transport(e.to_string()))?;

    tracing::debug!(url = %url, "Websocket subscription requested");

    let frames = ws.filter_map(move |msg| {
        let decode = decode.clone();
        async move {
            match msg {
                Ok(Message::Text(text)) => decode_frame(text.as_bytes(), &decode),
                Ok(Message::Binary(bytes)) => decode_frame(&bytes, &decode),
                Ok(_) => None,
                Err(e) => Some(Err(ChainError::Transport(e.to_string()))),
            }
        }
    });

    Ok(frames.boxed())
}

fn decode_frame(bytes: &[u8], decode: &FrameDecoder) -> Option<ChainResult<HeaderEvent>> {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => return Some(Err(ChainError::Decode(format!("malformed frame: {}", e)))),
    };
    if let Some(err) = subscription_error(&value) {
        return Some(Err(err));
    }
    decode(&value).transpose()
}

/// A subscribe handshake rejected with "method not found" means the node
/// does not stream; any other error object is a plain RPC failure.
fn subscription_error(value: &Value) -> Option<ChainError> {
    let error = value.get("error").filter(|e| !e.is_null())?;
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    if code == METHOD_NOT_FOUND {
        return Some(ChainError::Unsupported(Capability::Websocket));
    }
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("subscription failed")
        .to_string();
    Some(ChainError::Rpc { code, message })
}

fn map_connect_error(err: tungstenite::Error) -> ChainError {
    match err {
        tungstenite::Error::Http(response) if matches!(response.status().as_u16(), 404 | 405 | 501) => {
            ChainError::Unsupported(Capability::Websocket)
        }
        other => ChainError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::EthereumHeader;
    use serde_json::json;

    fn decoder() -> FrameDecoder {
        Arc::new(|value: &Value| {
            let Some(number) = value.pointer("/params/result/number").and_then(Value::as_u64) else {
                return Ok(None);
            };
            Ok(Some(HeaderEvent::Ethereum(EthereumHeader {
                number,
                hash: format!("0x{:x}", number),
                parent_hash: String::new(),
                timestamp: number,
            })))
        })
    }

    #[test]
    fn test_ack_frames_are_skipped() {
        let frame = json!({"jsonrpc": "2.0", "id": 1, "result": "0xabc"}).to_string();
        assert!(decode_frame(frame.as_bytes(), &decoder()).is_none());
    }

    #[test]
    fn test_malformed_frame_is_a_decode_error() {
        let result = decode_frame(b"{not json", &decoder()).unwrap();
        assert!(matches!(result, Err(ChainError::Decode(_))));
    }

    #[test]
    fn test_method_not_found_means_unsupported() {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "method not found"}
        })
        .to_string();
        let result = decode_frame(frame.as_bytes(), &decoder()).unwrap();
        assert!(matches!(result, Err(ChainError::Unsupported(Capability::Websocket))));
    }

    #[test]
    fn test_header_frame_decodes() {
        let frame = json!({"params": {"result": {"number": 12}}}).to_string();
        let header = decode_frame(frame.as_bytes(), &decoder()).unwrap().unwrap();
        assert_eq!(header.number(), 12);
    }
}
