//! Event publishing and in-process delivery.
//!
//! # Data Flow
//! ```text
//! daemon   → publish(<prefix>.block.finalized)  ─┐
//! daemon   → publish(<prefix>.network.status)    ├→ Publisher (memory | redis)
//! pipeline → publish(<prefix>.tx.receipt)       ─┘        │
//!                                                          ▼
//!                              Dispatcher (ack-wait redelivery, max deliveries)
//!                                  ├→ block.finalized → Finalizer
//!                                  └→ tx.receipt      → ReceiptConsumer
//! ```

pub mod dispatcher;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::types::NetworkId;

pub use dispatcher::{Delivery, Disposition, Dispatcher, Handler};
pub use memory::{BroadcastPublisher, Message};
pub use self::redis::RedisPublisher;

#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("publish backend error: {0}")]
    Backend(String),
}

/// Fire-and-forget event emission.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Serialize `value` as JSON and publish it.
pub async fn publish_json<T: Serialize + ?Sized>(
    publisher: &dyn Publisher,
    subject: &str,
    value: &T,
) -> Result<(), PublishError> {
    let payload = serde_json::to_vec(value).map_err(|e| PublishError::Encode(e.to_string()))?;
    publisher.publish(subject, payload).await
}

/// Subject names under a common prefix.
#[derive(Debug, Clone)]
pub struct Subjects {
    prefix: String,
}

impl Subjects {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn block_finalized(&self) -> String {
        format!("{}.block.finalized", self.prefix)
    }

    pub fn tx_receipt(&self) -> String {
        format!("{}.tx.receipt", self.prefix)
    }

    pub fn network_status(&self) -> String {
        format!("{}.network.status", self.prefix)
    }
}

/// Payload of `<prefix>.block.finalized`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockFinalized {
    pub network_id: NetworkId,
    pub block: u64,
    pub blockhash: String,
    /// Milliseconds since epoch.
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects() {
        let subjects = Subjects::new("nchain");
        assert_eq!(subjects.block_finalized(), "nchain.block.finalized");
        assert_eq!(subjects.tx_receipt(), "nchain.tx.receipt");
        assert_eq!(subjects.network_status(), "nchain.network.status");
    }

    #[test]
    fn test_block_finalized_wire_shape() {
        let event = BlockFinalized {
            network_id: NetworkId::new(),
            block: 12,
            blockhash: "0xabc".to_string(),
            timestamp: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["blockhash"], "0xabc");
        assert_eq!(value["block"], 12);
        assert!(value["network_id"].is_string());
    }
}
