//! Persistence boundary.
//!
//! # Data Flow
//! ```text
//! pipeline  → TransactionStore::insert (pending, before broadcast)
//!           → TransactionStore::update (broadcast / failed)
//! finalizer → TransactionStore::update (success / failed, latencies)
//!           → ContractStore (contract on deploy, token on discovery)
//! pipeline  → AccountStore (signer lookup)
//! ```
//!
//! The relational schema lives elsewhere; [`MemoryStore`] backs the service
//! binary and the tests.

pub mod memory;
pub mod records;

use alloy::primitives::Address;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::chain::types::NetworkId;
use crate::tx::types::Transaction;

pub use memory::MemoryStore;
pub use records::{Account, Contract, Token};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(Uuid),

    #[error("record {0} already exists")]
    Duplicate(Uuid),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> Result<(), StoreError>;

    async fn update(&self, tx: &Transaction) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn insert_contract(&self, contract: &Contract) -> Result<(), StoreError>;

    async fn contract_at(
        &self,
        network: &NetworkId,
        address: Address,
    ) -> Result<Option<Contract>, StoreError>;

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError>;

    async fn token_for(&self, contract_id: Uuid) -> Result<Option<Token>, StoreError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn account_by_address(
        &self,
        network: &NetworkId,
        address: Address,
    ) -> Result<Option<Account>, StoreError>;
}
