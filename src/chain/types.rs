//! Chain-agnostic types and error definitions.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Network identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub Uuid);

impl NetworkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NetworkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NetworkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Supported chain families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Ethereum,
    Bcoin,
    Baseledger,
}

/// Optional adapter capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    JsonRpc,
    Websocket,
    Signing,
    Trace,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::JsonRpc => "JSON-RPC",
            Capability::Websocket => "websocket",
            Capability::Signing => "signing",
            Capability::Trace => "tracing",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during chain operations.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// The network does not offer this capability; callers switch strategy.
    #[error("{0} not supported")]
    Unsupported(Capability),

    /// Connection refused, reset or closed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single frame or response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    #[error("signing failed: {0}")]
    Signing(String),

    /// The node rejected a signed transaction.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    /// No network record with this id is configured.
    #[error("unknown network {0}")]
    UnknownNetwork(NetworkId),
}

impl ChainError {
    /// True for the distinguished "capability not supported" signal.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ChainError::Unsupported(_))
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Ethereum-family block header, reduced to the fields the core reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthereumHeader {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    /// Seconds since epoch.
    pub timestamp: u64,
}

/// Bcoin (UTXO) block header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcoinHeader {
    pub height: u64,
    pub hash: String,
    pub merkle_root: String,
    /// Seconds since epoch.
    pub time: u64,
}

/// Baseledger (Tendermint) block header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseledgerHeader {
    pub height: u64,
    pub hash: String,
    pub chain_id: String,
    /// Seconds since epoch.
    pub time: u64,
}

/// A block header from any supported chain, normalized at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum HeaderEvent {
    Ethereum(EthereumHeader),
    Bcoin(BcoinHeader),
    Baseledger(BaseledgerHeader),
}

impl HeaderEvent {
    pub fn number(&self) -> u64 {
        match self {
            HeaderEvent::Ethereum(h) => h.number,
            HeaderEvent::Bcoin(h) => h.height,
            HeaderEvent::Baseledger(h) => h.height,
        }
    }

    pub fn hash(&self) -> &str {
        match self {
            HeaderEvent::Ethereum(h) => &h.hash,
            HeaderEvent::Bcoin(h) => &h.hash,
            HeaderEvent::Baseledger(h) => &h.hash,
        }
    }

    /// Block identity used for de-duplication: merkle root on bcoin, hash elsewhere.
    pub fn identity(&self) -> &str {
        match self {
            HeaderEvent::Bcoin(h) => &h.merkle_root,
            other => other.hash(),
        }
    }

    /// Block time in seconds since epoch.
    pub fn timestamp(&self) -> u64 {
        match self {
            HeaderEvent::Ethereum(h) => h.timestamp,
            HeaderEvent::Bcoin(h) => h.time,
            HeaderEvent::Baseledger(h) => h.time,
        }
    }
}

/// Parameters for signing one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TxParams {
    pub chain_id: u64,
    pub nonce: u64,
    /// `None` creates a contract.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub gas: u64,
    /// Wei; fetched from the node when absent.
    pub gas_price: Option<u128>,
}

/// A signed, broadcast-ready transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTx {
    pub hash: String,
    pub raw: Bytes,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub success: bool,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
}
