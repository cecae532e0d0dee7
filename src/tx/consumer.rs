//! Pub/sub handlers that drive finalization.

use std::sync::Arc;

use async_trait::async_trait;

use crate::pubsub::{BlockFinalized, Delivery, Disposition, Handler};
use crate::tx::finalize::{FetchOutcome, FinalizeError, Finalizer};
use crate::tx::types::Transaction;

/// Handles `<prefix>.tx.receipt`.
///
/// First-time failures wait out the ack window; only an already redelivered
/// message is nacked, so a failing receipt never spins in a tight loop.
pub struct ReceiptConsumer {
    finalizer: Arc<Finalizer>,
}

impl ReceiptConsumer {
    pub fn new(finalizer: Arc<Finalizer>) -> Self {
        Self { finalizer }
    }

    fn retry(delivery: &Delivery) -> Disposition {
        if delivery.redelivered() {
            Disposition::Nack
        } else {
            Disposition::AwaitRedelivery
        }
    }
}

#[async_trait]
impl Handler for ReceiptConsumer {
    async fn handle(&self, delivery: &Delivery) -> Disposition {
        let tx: Transaction = match serde_json::from_slice(&delivery.payload) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(subject = %delivery.subject, error = %e, "Dropping malformed receipt message");
                return Disposition::Ack;
            }
        };

        let fetched =
            tokio::time::timeout(self.finalizer.receipt_timeout(), self.finalizer.fetch_receipt(tx.id)).await;

        match fetched {
            Ok(Ok(FetchOutcome::Finalized(_))) | Ok(Ok(FetchOutcome::AlreadyFinal)) => Disposition::Ack,
            Ok(Err(FinalizeError::NotFound(_))) | Ok(Err(FinalizeError::MissingHash(_))) => {
                tracing::warn!(tx_id = %tx.id, "Receipt message for unknown or unsent transaction");
                Disposition::Ack
            }
            Ok(Ok(FetchOutcome::NotMined)) | Ok(Ok(FetchOutcome::InProgress)) => Self::retry(delivery),
            Ok(Err(e)) => {
                tracing::warn!(tx_id = %tx.id, attempt = delivery.attempt, error = %e, "Receipt fetch failed");
                Self::retry(delivery)
            }
            Err(_) => {
                tracing::warn!(tx_id = %tx.id, attempt = delivery.attempt, "Receipt fetch timed out");
                Self::retry(delivery)
            }
        }
    }
}

/// Handles `<prefix>.block.finalized` by fanning out receipt fetches.
pub struct BlockFinalizedHandler {
    finalizer: Arc<Finalizer>,
}

impl BlockFinalizedHandler {
    pub fn new(finalizer: Arc<Finalizer>) -> Self {
        Self { finalizer }
    }
}

#[async_trait]
impl Handler for BlockFinalizedHandler {
    async fn handle(&self, delivery: &Delivery) -> Disposition {
        match serde_json::from_slice::<BlockFinalized>(&delivery.payload) {
            Ok(event) => {
                let spawned = self.finalizer.on_block_finalized(&event);
                if spawned > 0 {
                    tracing::debug!(network_id = %event.network_id, block = event.block, pending = spawned, "Fetching receipts");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Dropping malformed block finalized message"),
        }
        Disposition::Ack
    }
}
