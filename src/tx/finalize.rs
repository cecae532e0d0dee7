//! Receipt fetching, finalization and contract/token discovery.
//!
//! # Data Flow
//! ```text
//! <prefix>.block.finalized → on_block_finalized → one fetch per pending tx
//! <prefix>.tx.receipt      → ReceiptConsumer    → fetch_receipt(tx)
//!
//! fetch_receipt:
//!     skip terminal → adapter.tx_receipt → status, latencies, trace → store
//!     deploy succeeded → Contract → token probe every 5s until 60s
//!
//! pending older than pending_ttl → untracked and marked failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::chain::adapter::{AdapterSource, ChainAdapter};
use crate::chain::types::{ChainError, NetworkId};
use crate::config::schema::FinalizerConfig;
use crate::observability::metrics;
use crate::pubsub::BlockFinalized;
use crate::store::{Contract, ContractStore, StoreError, Token, TransactionStore};
use crate::tx::types::{now_millis, FieldError, Transaction, TxStatus};

sol! {
    function name() external view returns (string);
    function symbol() external view returns (string);
    function decimals() external view returns (uint8);
}

#[derive(Debug, Clone, Error)]
pub enum FinalizeError {
    #[error("transaction {0} not found")]
    NotFound(Uuid),

    #[error("transaction {0} has no hash")]
    MissingHash(Uuid),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Finalized(Box<Transaction>),
    /// No receipt yet; try again on a later block.
    NotMined,
    AlreadyFinal,
    /// Another fetch for the same transaction is running.
    InProgress,
}

/// Removes its id from the in-flight set when dropped, including when the
/// fetch is cancelled by a timeout.
struct InFlight<'a> {
    set: &'a DashSet<Uuid>,
    id: Uuid,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

struct Pending {
    network_id: NetworkId,
    tracked_at: Instant,
}

pub struct Finalizer {
    adapters: Arc<dyn AdapterSource>,
    transactions: Arc<dyn TransactionStore>,
    contracts: Arc<dyn ContractStore>,
    config: FinalizerConfig,
    pending: DashMap<Uuid, Pending>,
    in_flight: DashSet<Uuid>,
}

impl Finalizer {
    pub fn new(
        adapters: Arc<dyn AdapterSource>,
        transactions: Arc<dyn TransactionStore>,
        contracts: Arc<dyn ContractStore>,
        config: FinalizerConfig,
    ) -> Self {
        Self {
            adapters,
            transactions,
            contracts,
            config,
            pending: DashMap::new(),
            in_flight: DashSet::new(),
        }
    }

    /// Watch a broadcast transaction until it is finalized.
    pub fn track(&self, tx: &Transaction) {
        if !tx.status.is_terminal() {
            self.pending.insert(
                tx.id,
                Pending {
                    network_id: tx.network_id.clone(),
                    tracked_at: Instant::now(),
                },
            );
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.config.receipt_timeout_secs)
    }

    fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.config.pending_ttl_secs)
    }

    /// Spawn one bounded receipt fetch per pending transaction on the event's
    /// network. Transactions pending longer than `pending_ttl_secs` are
    /// dropped and marked failed instead. Returns how many fetches were spawned.
    pub fn on_block_finalized(self: &Arc<Self>, event: &BlockFinalized) -> usize {
        let ttl = self.pending_ttl();
        let mut ids = Vec::new();
        let mut expired = Vec::new();
        for entry in self.pending.iter() {
            if entry.network_id != event.network_id {
                continue;
            }
            if entry.tracked_at.elapsed() >= ttl {
                expired.push(*entry.key());
            } else {
                ids.push(*entry.key());
            }
        }

        for id in expired {
            if self.pending.remove(&id).is_none() {
                continue;
            }
            let finalizer = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = finalizer.expire(id).await {
                    tracing::warn!(tx_id = %id, error = %e, "Failed to expire transaction");
                }
            });
        }

        for id in &ids {
            let finalizer = Arc::clone(self);
            let id = *id;
            let block = event.block;
            tokio::spawn(async move {
                match tokio::time::timeout(finalizer.receipt_timeout(), finalizer.fetch_receipt(id)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(tx_id = %id, block = block, error = %e, "Receipt fetch failed"),
                    Err(_) => tracing::warn!(tx_id = %id, block = block, "Receipt fetch timed out"),
                }
            });
        }
        ids.len()
    }

    /// Fetch the receipt of one transaction and finalize it. Idempotent.
    pub async fn fetch_receipt(&self, id: Uuid) -> Result<FetchOutcome, FinalizeError> {
        if !self.in_flight.insert(id) {
            return Ok(FetchOutcome::InProgress);
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            id,
        };

        let Some(mut tx) = self.transactions.get(id).await? else {
            self.pending.remove(&id);
            return Err(FinalizeError::NotFound(id));
        };
        if tx.status.is_terminal() {
            self.pending.remove(&id);
            return Ok(FetchOutcome::AlreadyFinal);
        }
        let hash = tx.hash.clone().ok_or(FinalizeError::MissingHash(id))?;

        let adapter = self.adapters.adapter(&tx.network_id)?;
        let receipt = match adapter.tx_receipt(&hash).await? {
            Some(receipt) if receipt.block_number.is_some() => receipt,
            _ => return Ok(FetchOutcome::NotMined),
        };

        let status = if receipt.success {
            TxStatus::Success
        } else {
            TxStatus::Failed
        };
        tx.status.transition(status);
        if !receipt.success {
            tx.errors.push(FieldError::message("transaction reverted"));
        }
        tx.block = receipt.block_number;
        tx.block_hash = receipt.block_hash.clone();
        tx.contract_address = receipt.contract_address;
        tx.finalized_at = Some(now_millis());
        tx.derive_latencies();

        match adapter.tx_trace(&hash).await {
            Ok(trace) => tx.traces = Some(trace),
            Err(e) if e.is_unsupported() => {}
            Err(e) => tracing::debug!(tx_id = %id, error = %e, "Trace unavailable"),
        }

        self.transactions.update(&tx).await?;
        self.pending.remove(&id);
        record_finalized(&tx);

        tracing::info!(
            tx_id = %id,
            hash = %hash,
            status = tx.status.as_str(),
            block = ?tx.block,
            "Transaction finalized"
        );

        if tx.is_contract_creation() && receipt.success {
            if let Some(address) = receipt.contract_address {
                self.create_contract(&tx, address, adapter).await?;
            }
        }

        Ok(FetchOutcome::Finalized(Box::new(tx)))
    }

    async fn expire(&self, id: Uuid) -> Result<(), FinalizeError> {
        let Some(mut tx) = self.transactions.get(id).await? else {
            return Ok(());
        };
        if tx.status.is_terminal() {
            return Ok(());
        }
        tx.fail(format!(
            "not mined within {}s of broadcast",
            self.config.pending_ttl_secs
        ));
        self.transactions.update(&tx).await?;
        metrics::record_receipt("expired");
        tracing::warn!(tx_id = %id, hash = ?tx.hash, "Transaction expired before it was mined");
        Ok(())
    }

    async fn create_contract(
        &self,
        tx: &Transaction,
        address: Address,
        adapter: Arc<dyn ChainAdapter>,
    ) -> Result<(), FinalizeError> {
        let contract = Contract {
            id: Uuid::new_v4(),
            network_id: tx.network_id.clone(),
            transaction_id: tx.id,
            address,
            name: tx.description.clone(),
        };
        self.contracts.insert_contract(&contract).await?;
        tracing::info!(contract_id = %contract.id, address = %address, "Contract created");

        let contracts = self.contracts.clone();
        let interval = Duration::from_secs(self.config.discovery_interval_secs);
        let timeout = Duration::from_secs(self.config.discovery_timeout_secs);
        tokio::spawn(async move {
            discover_token(adapter, contracts, contract, interval, timeout).await;
        });
        Ok(())
    }
}

fn record_finalized(tx: &Transaction) {
    metrics::record_receipt(tx.status.as_str());
    if let Some(ms) = tx.publish_latency {
        metrics::record_tx_latency("publish", ms);
    }
    if let Some(ms) = tx.broadcast_latency {
        metrics::record_tx_latency("broadcast", ms);
    }
    if let Some(ms) = tx.e2e_latency {
        metrics::record_tx_latency("e2e", ms);
    }
}

async fn call_raw(adapter: &dyn ChainAdapter, address: Address, calldata: Vec<u8>) -> Option<Bytes> {
    adapter.call(address, Bytes::from(calldata)).await.ok()
}

/// Read `name()`, `symbol()` and `decimals()`. `None` unless all three answer.
pub async fn probe_token(adapter: &dyn ChainAdapter, address: Address) -> Option<(String, String, u8)> {
    let name = call_raw(adapter, address, nameCall {}.abi_encode()).await?;
    let name = String::abi_decode(&name).ok()?;
    let symbol = call_raw(adapter, address, symbolCall {}.abi_encode()).await?;
    let symbol = String::abi_decode(&symbol).ok()?;
    let decimals = call_raw(adapter, address, decimalsCall {}.abi_encode()).await?;
    let decimals = decimalsCall::abi_decode_returns(&decimals).ok()?;
    Some((name, symbol, decimals))
}

/// Probe a freshly deployed contract until it answers as a token or the
/// window closes. Deployed code may not be queryable right away.
pub async fn discover_token(
    adapter: Arc<dyn ChainAdapter>,
    contracts: Arc<dyn ContractStore>,
    contract: Contract,
    interval: Duration,
    timeout: Duration,
) -> Option<Token> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if let Some((name, symbol, decimals)) = probe_token(adapter.as_ref(), contract.address).await {
            let token = Token {
                id: Uuid::new_v4(),
                network_id: contract.network_id.clone(),
                contract_id: contract.id,
                address: contract.address,
                name,
                symbol,
                decimals,
            };
            if let Err(e) = contracts.insert_token(&token).await {
                tracing::warn!(contract_id = %contract.id, error = %e, "Failed to store token");
                return None;
            }
            metrics::record_token_discovered();
            tracing::info!(
                contract_id = %contract.id,
                symbol = %token.symbol,
                decimals = token.decimals,
                "Token discovered"
            );
            return Some(token);
        }

        if tokio::time::Instant::now() + interval > deadline {
            tracing::debug!(contract_id = %contract.id, "Contract is not a token");
            return None;
        }
        tokio::time::sleep(interval).await;
    }
}
