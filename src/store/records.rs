//! Account, contract and token records.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::types::{ChainResult, NetworkId};
use crate::chain::wallet::Wallet;
use crate::config::schema::AccountConfig;

/// A signing account scoped to an application or a user.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub network_id: NetworkId,
    pub application_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub wallet: Wallet,
}

impl Account {
    /// Load the account key from the environment variable named in config.
    pub fn from_config(config: &AccountConfig) -> ChainResult<Self> {
        Ok(Self {
            id: config.id,
            network_id: config.network_id.clone(),
            application_id: config.application_id,
            user_id: config.user_id,
            wallet: Wallet::from_env(&config.private_key_env)?,
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

/// A deployed contract, created when a deploy transaction is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Uuid,
    pub network_id: NetworkId,
    pub transaction_id: Uuid,
    pub address: Address,
    pub name: Option<String>,
}

/// A contract that answered `name()`, `symbol()` and `decimals()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub network_id: NetworkId,
    pub contract_id: Uuid,
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}
