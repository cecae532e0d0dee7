//! Chain adapter subsystem.
//!
//! # Data Flow
//! ```text
//! NetworkConfig (family, rpc/websocket URLs)
//!     → source.rs (one cached adapter per network, rebuilt on reload)
//!     → ethereum.rs | bcoin.rs | baseledger.rs (ChainAdapter impls)
//!         → rpc.rs (JSON-RPC over HTTP, point queries)
//!         → stream.rs (websocket subscription → HeaderStream)
//!     → HeaderEvent / Receipt / SignedTx (types.rs)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables (wallet.rs)
//! - Never log private keys or signed payloads
//! - All RPC calls have configurable timeouts

pub mod adapter;
pub mod baseledger;
pub mod bcoin;
pub mod ethereum;
pub mod rpc;
pub mod source;
pub mod stream;
pub mod types;
pub mod wallet;

pub use adapter::{AdapterSource, ChainAdapter, HeaderStream};
pub use source::AdapterCache;
pub use types::{
    Capability, ChainError, ChainFamily, ChainResult, HeaderEvent, NetworkId, Receipt, SignedTx,
    TxParams,
};
pub use wallet::Wallet;
