//! Validate → allocate nonce → sign → persist → broadcast.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::chain::adapter::{AdapterSource, ChainAdapter};
use crate::chain::types::{ChainError, NetworkId, SignedTx, TxParams};
use crate::config::SharedConfig;
use crate::nonce::{NonceAllocator, NonceError};
use crate::observability::metrics;
use crate::pubsub::{publish_json, Publisher, Subjects};
use crate::store::{Account, AccountStore, StoreError, TransactionStore};
use crate::tx::finalize::Finalizer;
use crate::tx::recovery::parse_minimal_gas;
use crate::tx::types::{now_millis, FieldError, Transaction, TransactionRequest};

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("validation failed: {}", join_messages(.0))]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Nonce(#[from] NonceError),

    #[error("signing failed for transaction {id}: {message}")]
    Signing { id: Uuid, message: String },

    #[error("broadcast failed for transaction {id}: {message}")]
    Broadcast { id: Uuid, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collaborators of the pipeline.
pub struct PipelineDeps {
    pub config: SharedConfig,
    pub adapters: Arc<dyn AdapterSource>,
    pub accounts: Arc<dyn AccountStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub nonces: NonceAllocator,
    pub publisher: Arc<dyn Publisher>,
    pub subjects: Subjects,
    pub finalizer: Arc<Finalizer>,
}

pub struct TxPipeline {
    deps: PipelineDeps,
    signer_locks: DashMap<(NetworkId, Address), Arc<Mutex<()>>>,
}

impl TxPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps,
            signer_locks: DashMap::new(),
        }
    }

    /// Sign and broadcast one transaction.
    ///
    /// Invalid requests are rejected before a nonce is taken. Nonce allocation,
    /// signing, persistence and broadcast run under one lock per signer so a
    /// signer's transactions reach the node in nonce order.
    pub async fn submit(&self, request: TransactionRequest) -> Result<Transaction, PipelineError> {
        let Validated {
            account,
            adapter,
            chain_id,
        } = self.validate(&request).await?;
        let address = account.address();

        let lock = self
            .signer_locks
            .entry((request.network_id.clone(), address))
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let nonce = match request.nonce {
            Some(nonce) => {
                metrics::record_nonce_allocation("explicit");
                nonce
            }
            None => {
                self.deps
                    .nonces
                    .next_nonce(&request.network_id, address, adapter.as_ref())
                    .await?
            }
        };

        let mut tx = Transaction::from_request(&request, Some(account.id), address);
        tx.nonce = Some(nonce);
        let mut params = TxParams {
            chain_id,
            nonce,
            to: request.to,
            value: request.value,
            data: request.data.clone(),
            gas: request.gas,
            gas_price: request.gas_price,
        };

        let signed = match adapter.sign_tx(&account.wallet, &params).await {
            Ok(signed) => signed,
            Err(e) => {
                let message = e.to_string();
                tx.fail(message.clone());
                self.deps.transactions.insert(&tx).await?;
                tracing::warn!(tx_id = %tx.id, error = %message, "Signing failed");
                return Err(PipelineError::Signing { id: tx.id, message });
            }
        };
        set_signed(&mut tx, &signed);
        self.deps.transactions.insert(&tx).await?;

        let broadcast = match adapter.broadcast_tx(&signed).await {
            Ok(hash) => Ok(hash),
            Err(e) => {
                let message = e.to_string();
                match parse_minimal_gas(&message) {
                    Some(gas) => self.retry_with_gas(adapter.as_ref(), &account, &mut tx, &mut params, gas).await,
                    None => Err(message),
                }
            }
        };

        match broadcast {
            Ok(hash) => {
                metrics::record_broadcast("success");
                tx.hash = Some(hash);
                tx.broadcast_at = Some(now_millis());
                tx.derive_latencies();
                self.deps.transactions.update(&tx).await?;

                tracing::info!(
                    tx_id = %tx.id,
                    network_id = %tx.network_id,
                    nonce = nonce,
                    hash = ?tx.hash,
                    "Transaction broadcast"
                );

                let subject = self.deps.subjects.tx_receipt();
                if let Err(e) = publish_json(self.deps.publisher.as_ref(), &subject, &tx).await {
                    tracing::warn!(tx_id = %tx.id, error = %e, "Failed to publish receipt request");
                }
                self.deps.finalizer.track(&tx);
                Ok(tx)
            }
            Err(message) => {
                metrics::record_broadcast("failed");
                tx.fail(message.clone());
                self.deps.transactions.update(&tx).await?;
                tracing::warn!(tx_id = %tx.id, error = %message, "Broadcast failed");
                Err(PipelineError::Broadcast { id: tx.id, message })
            }
        }
    }

    /// Re-sign with the node-reported minimum gas and broadcast exactly once more.
    async fn retry_with_gas(
        &self,
        adapter: &dyn ChainAdapter,
        account: &Account,
        tx: &mut Transaction,
        params: &mut TxParams,
        gas: u64,
    ) -> Result<String, String> {
        metrics::record_gas_recovery();
        tracing::info!(tx_id = %tx.id, gas = gas, "Retrying broadcast with node-reported minimum gas");

        params.gas = gas;
        tx.gas = gas;
        let signed = adapter
            .sign_tx(&account.wallet, params)
            .await
            .map_err(|e| e.to_string())?;
        set_signed(tx, &signed);

        adapter.broadcast_tx(&signed).await.map_err(|e| e.to_string())
    }

    /// Configured chain id, else the one the node reports.
    async fn chain_id(&self, network: &NetworkId, adapter: &dyn ChainAdapter) -> Result<String, ChainError> {
        let configured = self
            .deps
            .config
            .load()
            .network(network)
            .and_then(|n| n.chain_id.clone());
        match configured {
            Some(id) => Ok(id),
            None => adapter.chain_id().await,
        }
    }

    /// Everything that can reject a request, including chain id resolution,
    /// runs here so a rejected request never takes a nonce.
    async fn validate(&self, request: &TransactionRequest) -> Result<Validated, PipelineError> {
        let mut errors = Vec::new();

        if request.application_id.is_some() == request.user_id.is_some() {
            errors.push(FieldError::new(
                "application_id",
                "exactly one of application_id or user_id must be set",
            ));
        }

        let adapter = if self.deps.config.load().network(&request.network_id).is_some() {
            match self.deps.adapters.adapter(&request.network_id) {
                Ok(adapter) => Some(adapter),
                Err(e) => {
                    errors.push(FieldError::new("network_id", format!("network unavailable: {}", e)));
                    None
                }
            }
        } else {
            errors.push(FieldError::new("network_id", "network not found"));
            None
        };

        let account = match (request.account_id, request.account_address) {
            (Some(id), _) => self.deps.accounts.account(id).await?,
            (None, Some(address)) => {
                self.deps
                    .accounts
                    .account_by_address(&request.network_id, address)
                    .await?
            }
            (None, None) => None,
        };

        match &account {
            None if request.account_id.is_none() && request.account_address.is_none() => {
                errors.push(FieldError::new("account_id", "account_id or account_address is required"));
            }
            None => errors.push(FieldError::new("account_id", "signer not found")),
            Some(account) => {
                if account.application_id.is_some() && account.network_id != request.network_id {
                    errors.push(FieldError::new(
                        "network_id",
                        "signer belongs to a different network",
                    ));
                }
            }
        }

        let (Some(account), Some(adapter)) = (account, adapter) else {
            return Err(PipelineError::Validation(errors));
        };
        if !errors.is_empty() {
            return Err(PipelineError::Validation(errors));
        }

        let raw = self.chain_id(&request.network_id, adapter.as_ref()).await?;
        let chain_id = raw.parse().map_err(|_| {
            PipelineError::Validation(vec![FieldError::new(
                "network_id",
                format!("non-numeric chain id '{}'", raw),
            )])
        })?;

        Ok(Validated {
            account,
            adapter,
            chain_id,
        })
    }
}

struct Validated {
    account: Account,
    adapter: Arc<dyn ChainAdapter>,
    chain_id: u64,
}

fn set_signed(tx: &mut Transaction, signed: &SignedTx) {
    tx.hash = Some(signed.hash.clone());
    tx.signed_tx = Some(signed.raw.clone());
}
