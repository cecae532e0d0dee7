//! `DashMap`-backed store.

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::chain::types::NetworkId;
use crate::store::{
    Account, AccountStore, Contract, ContractStore, StoreError, Token, TransactionStore,
};
use crate::tx::types::Transaction;

#[derive(Debug, Default)]
pub struct MemoryStore {
    transactions: DashMap<Uuid, Transaction>,
    contracts: DashMap<Uuid, Contract>,
    tokens: DashMap<Uuid, Token>,
    accounts: DashMap<Uuid, Account>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.add_account(account);
        }
        store
    }

    pub fn add_account(&self, account: Account) {
        self.accounts.insert(account.id, account);
    }

    pub fn transaction(&self, id: Uuid) -> Option<Transaction> {
        self.transactions.get(&id).map(|t| t.value().clone())
    }

    pub fn contracts(&self) -> Vec<Contract> {
        self.contracts.iter().map(|c| c.value().clone()).collect()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.tokens.iter().map(|t| t.value().clone()).collect()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert(&self, tx: &Transaction) -> Result<(), StoreError> {
        match self.transactions.entry(tx.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(tx.id)),
            Entry::Vacant(slot) => {
                slot.insert(tx.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, tx: &Transaction) -> Result<(), StoreError> {
        match self.transactions.get_mut(&tx.id) {
            Some(mut existing) => {
                *existing = tx.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(tx.id)),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        Ok(self.transactions.get(&id).map(|t| t.value().clone()))
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn insert_contract(&self, contract: &Contract) -> Result<(), StoreError> {
        self.contracts.insert(contract.id, contract.clone());
        Ok(())
    }

    async fn contract_at(
        &self,
        network: &NetworkId,
        address: Address,
    ) -> Result<Option<Contract>, StoreError> {
        Ok(self
            .contracts
            .iter()
            .find(|c| &c.network_id == network && c.address == address)
            .map(|c| c.value().clone()))
    }

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        self.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn token_for(&self, contract_id: Uuid) -> Result<Option<Token>, StoreError> {
        Ok(self
            .tokens
            .iter()
            .find(|t| t.contract_id == contract_id)
            .map(|t| t.value().clone()))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).map(|a| a.value().clone()))
    }

    async fn account_by_address(
        &self,
        network: &NetworkId,
        address: Address,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .find(|a| &a.network_id == network && a.address() == address)
            .map(|a| a.value().clone()))
    }
}
