//! Transaction records and requests.

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::chain::types::NetworkId;

/// Milliseconds since epoch.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Lifecycle status. `Failed` and `Success` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    #[default]
    Pending,
    Failed,
    Success,
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Failed => "failed",
            TxStatus::Success => "success",
        }
    }

    /// Move forward to `next`. Returns `false` (and changes nothing) when the
    /// move would leave a terminal status.
    pub fn transition(&mut self, next: TxStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        *self = next;
        true
    }
}

/// Structured error attached to a request or record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

/// Inbound request to sign and broadcast one transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub network_id: NetworkId,
    #[serde(default)]
    pub application_id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    /// Signer by account id.
    #[serde(default)]
    pub account_id: Option<Uuid>,
    /// Signer by address; used when no account id is given.
    #[serde(default)]
    pub account_address: Option<Address>,
    /// `None` deploys a contract.
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    /// Zero lets the node report the minimum.
    #[serde(default)]
    pub gas: u64,
    #[serde(default)]
    pub gas_price: Option<u128>,
    /// Caller-chosen nonce; bypasses the allocator.
    #[serde(default)]
    pub nonce: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    /// When the request entered the system (ms); defaults to receipt time.
    #[serde(default)]
    pub published_at: Option<u64>,
}

/// One broadcast attempt and everything learned about it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub network_id: NetworkId,
    pub application_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub nonce: Option<u64>,
    pub gas: u64,
    pub gas_price: Option<u128>,
    pub hash: Option<String>,
    #[serde(skip)]
    pub signed_tx: Option<Bytes>,
    pub status: TxStatus,
    pub description: Option<String>,
    pub block: Option<u64>,
    pub block_hash: Option<String>,
    pub contract_address: Option<Address>,
    pub published_at: Option<u64>,
    pub broadcast_at: Option<u64>,
    pub finalized_at: Option<u64>,
    pub publish_latency: Option<u64>,
    pub broadcast_latency: Option<u64>,
    pub e2e_latency: Option<u64>,
    pub traces: Option<Value>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl Transaction {
    pub fn from_request(request: &TransactionRequest, account_id: Option<Uuid>, from: Address) -> Self {
        Self {
            id: Uuid::new_v4(),
            network_id: request.network_id.clone(),
            application_id: request.application_id,
            user_id: request.user_id,
            account_id,
            from: Some(from),
            to: request.to,
            value: request.value,
            data: request.data.clone(),
            nonce: request.nonce,
            gas: request.gas,
            gas_price: request.gas_price,
            hash: None,
            signed_tx: None,
            status: TxStatus::Pending,
            description: request.description.clone(),
            block: None,
            block_hash: None,
            contract_address: None,
            published_at: Some(request.published_at.unwrap_or_else(now_millis)),
            broadcast_at: None,
            finalized_at: None,
            publish_latency: None,
            broadcast_latency: None,
            e2e_latency: None,
            traces: None,
            errors: Vec::new(),
        }
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Mark failed with a reason. No-op once terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.status.transition(TxStatus::Failed) {
            self.errors.push(FieldError::message(reason.clone()));
            self.description = Some(reason);
        }
    }

    /// Fill the three latency fields from whichever timestamps are present.
    pub fn derive_latencies(&mut self) {
        if let (Some(published), Some(broadcast)) = (self.published_at, self.broadcast_at) {
            self.publish_latency = Some(broadcast.saturating_sub(published));
        }
        if let (Some(broadcast), Some(finalized)) = (self.broadcast_at, self.finalized_at) {
            self.broadcast_latency = Some(finalized.saturating_sub(broadcast));
        }
        if let (Some(published), Some(finalized)) = (self.published_at, self.finalized_at) {
            self.e2e_latency = Some(finalized.saturating_sub(published));
        }
    }
}
