//! Sign-and-broadcast pipeline: validation, gas recovery, receipts and
//! finalization.

use std::sync::atomic::Ordering;

use alloy::primitives::Address;
use uuid::Uuid;

use nchain::chain::{NetworkId, Receipt};
use nchain::cache::CacheStore;
use nchain::pubsub::{BlockFinalized, Delivery, Disposition, Handler};
use nchain::store::{ContractStore, TransactionStore};
use nchain::tx::{FetchOutcome, PipelineError, ReceiptConsumer, Transaction, TxStatus};

mod common;

use common::{eventually, Fixture, StubAdapter, ZERO_GAS_ERROR};

fn receipt(hash: &str, contract_address: Option<Address>) -> Receipt {
    Receipt {
        tx_hash: hash.to_string(),
        block_number: Some(100),
        block_hash: Some("0xbeef".to_string()),
        success: true,
        contract_address,
        gas_used: 21_000,
    }
}

#[tokio::test]
async fn test_zero_gas_is_recovered_exactly_once() {
    let fixture = Fixture::new(StubAdapter::default().with_mined_nonce(1));
    fixture.adapter.fail_broadcasts(&[ZERO_GAS_ERROR, ZERO_GAS_ERROR]);

    let mut request = fixture.request();
    request.gas = 0;
    let err = fixture.state.pipeline.submit(request).await.unwrap_err();

    let id = match err {
        PipelineError::Broadcast { id, message } => {
            assert!(message.contains("minimal: 21000"));
            id
        }
        other => panic!("unexpected error {:?}", other),
    };
    assert_eq!(fixture.adapter.broadcasts.load(Ordering::SeqCst), 2);
    assert_eq!(fixture.adapter.signed_gas(), vec![0, 21_000]);

    let stored = fixture.store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, TxStatus::Failed);
    assert_eq!(stored.gas, 21_000);
    assert!(stored.description.unwrap().contains("not enough gas"));
    assert_eq!(fixture.state.finalizer.pending_count(), 0);
}

#[tokio::test]
async fn test_zero_gas_recovery_succeeds() {
    let fixture = Fixture::new(StubAdapter::default());
    fixture.adapter.fail_broadcasts(&[ZERO_GAS_ERROR]);

    let mut request = fixture.request();
    request.gas = 0;
    let tx = fixture.state.pipeline.submit(request).await.unwrap();

    assert_eq!(tx.status, TxStatus::Pending);
    assert_eq!(tx.gas, 21_000);
    assert!(tx.hash.is_some());
    assert_eq!(fixture.adapter.broadcasts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_other_broadcast_errors_are_terminal() {
    let fixture = Fixture::new(StubAdapter::default());
    fixture.adapter.fail_broadcasts(&["nonce too low"]);

    let err = fixture.state.pipeline.submit(fixture.request()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Broadcast { .. }));
    assert_eq!(fixture.adapter.broadcasts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_validation_consumes_no_nonce() {
    let fixture = Fixture::new(StubAdapter::default().with_mined_nonce(9));

    let mut request = fixture.request();
    request.user_id = Some(Uuid::new_v4());
    request.network_id = NetworkId::new();
    let err = fixture.state.pipeline.submit(request).await.unwrap_err();

    match err {
        PipelineError::Validation(errors) => {
            let fields: Vec<_> = errors.iter().filter_map(|e| e.field.as_deref()).collect();
            assert!(fields.contains(&"application_id"));
            assert!(fields.contains(&"network_id"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(fixture.adapter.nonce_reads.load(Ordering::SeqCst), 0);
    assert!(fixture.adapter.signed.lock().unwrap().is_empty());

    // The next valid request still gets the chain floor.
    let tx = fixture.state.pipeline.submit(fixture.request()).await.unwrap();
    assert_eq!(tx.nonce, Some(9));
}

#[tokio::test]
async fn test_unparseable_chain_id_consumes_no_nonce() {
    let fixture = Fixture::with_config(StubAdapter::default().with_mined_nonce(5), |config| {
        config.networks[0].chain_id = Some("peachtree".to_string());
    });
    let key = fixture.nonce_key();

    for _ in 0..2 {
        let err = fixture.state.pipeline.submit(fixture.request()).await.unwrap_err();
        match err {
            PipelineError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.message.contains("peachtree")));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!(fixture.adapter.nonce_reads.load(Ordering::SeqCst), 0);
    assert!(fixture.cache.get(&key).await.unwrap().is_none());
    assert!(fixture.adapter.signed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_signer_is_rejected() {
    let fixture = Fixture::new(StubAdapter::default());
    let mut request = fixture.request();
    request.account_id = None;

    let err = fixture.state.pipeline.submit(request).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(fixture.adapter.broadcasts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_success_publishes_receipt_request() {
    let fixture = Fixture::new(StubAdapter::default().with_mined_nonce(3));

    let tx = fixture.state.pipeline.submit(fixture.request()).await.unwrap();
    assert_eq!(tx.nonce, Some(3));
    assert!(tx.broadcast_at.is_some());
    assert!(tx.publish_latency.is_some());

    let published = fixture.publisher.on("nchain.tx.receipt");
    assert_eq!(published.len(), 1);
    let snapshot: Transaction = serde_json::from_value(published[0].clone()).unwrap();
    assert_eq!(snapshot.id, tx.id);
    assert_eq!(snapshot.hash, tx.hash);

    let stored = fixture.store.get(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TxStatus::Pending);
    assert_eq!(fixture.state.finalizer.pending_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_signer_submissions_get_distinct_nonces() {
    let fixture = Fixture::new(StubAdapter::default().with_mined_nonce(0));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let pipeline = fixture.state.pipeline.clone();
        let request = fixture.request();
        tasks.push(tokio::spawn(async move { pipeline.submit(request).await.unwrap() }));
    }
    let mut nonces = Vec::new();
    for task in tasks {
        nonces.push(task.await.unwrap().nonce.unwrap());
    }
    nonces.sort_unstable();
    assert_eq!(nonces, (0..10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_block_finalized_drives_finalization() {
    let fixture = Fixture::new(StubAdapter::default());
    let tx = fixture.state.pipeline.submit(fixture.request()).await.unwrap();
    let hash = tx.hash.clone().unwrap();
    fixture.adapter.mine(&hash, receipt(&hash, None));

    let spawned = fixture.state.finalizer.on_block_finalized(&BlockFinalized {
        network_id: fixture.network.id.clone(),
        block: 100,
        blockhash: "0xbeef".to_string(),
        timestamp: 0,
    });
    assert_eq!(spawned, 1);

    let finalizer = fixture.state.finalizer.clone();
    assert!(eventually(|| finalizer.pending_count() == 0).await);

    let stored = fixture.store.get(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TxStatus::Success);
    assert_eq!(stored.block, Some(100));
    assert!(stored.e2e_latency.is_some());
    assert!(stored.broadcast_latency.is_some());

    // Finalization is idempotent.
    let again = fixture.state.finalizer.fetch_receipt(tx.id).await.unwrap();
    assert!(matches!(again, FetchOutcome::AlreadyFinal));
}

#[tokio::test]
async fn test_unmined_transaction_expires() {
    let fixture = Fixture::with_config(StubAdapter::default(), |config| {
        config.finalizer.pending_ttl_secs = 0;
    });
    let tx = fixture.state.pipeline.submit(fixture.request()).await.unwrap();
    assert_eq!(fixture.state.finalizer.pending_count(), 1);

    let spawned = fixture.state.finalizer.on_block_finalized(&BlockFinalized {
        network_id: fixture.network.id.clone(),
        block: 101,
        blockhash: "0xcafe".to_string(),
        timestamp: 0,
    });
    assert_eq!(spawned, 0);
    assert_eq!(fixture.state.finalizer.pending_count(), 0);

    let store = fixture.store.clone();
    let id = tx.id;
    assert!(
        eventually(|| store
            .transaction(id)
            .is_some_and(|t| t.status == TxStatus::Failed))
        .await
    );
    let stored = fixture.store.get(tx.id).await.unwrap().unwrap();
    assert!(stored.description.unwrap().contains("not mined"));
}

#[tokio::test]
async fn test_contract_creation_discovers_token() {
    let adapter = StubAdapter::with_token("Test Token", "TST", 18);
    let fixture = Fixture::with_config(adapter, |config| {
        config.finalizer.discovery_interval_secs = 0;
    });

    let mut request = fixture.request();
    request.to = None;
    request.description = Some("TestToken".to_string());
    let tx = fixture.state.pipeline.submit(request).await.unwrap();

    let hash = tx.hash.clone().unwrap();
    let deployed = Address::repeat_byte(0xcc);
    fixture.adapter.mine(&hash, receipt(&hash, Some(deployed)));

    let outcome = fixture.state.finalizer.fetch_receipt(tx.id).await.unwrap();
    let FetchOutcome::Finalized(finalized) = outcome else {
        panic!("expected finalized transaction");
    };
    assert_eq!(finalized.contract_address, Some(deployed));

    let contract = fixture
        .store
        .contract_at(&fixture.network.id, deployed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(contract.transaction_id, tx.id);
    assert_eq!(contract.name.as_deref(), Some("TestToken"));

    let store = fixture.store.clone();
    assert!(eventually(|| !store.tokens().is_empty()).await);
    let token = fixture.store.token_for(contract.id).await.unwrap().unwrap();
    assert_eq!(token.symbol, "TST");
    assert_eq!(token.decimals, 18);
}

#[tokio::test]
async fn test_receipt_consumer_redelivery_policy() {
    let fixture = Fixture::new(StubAdapter::default());
    let tx = fixture.state.pipeline.submit(fixture.request()).await.unwrap();
    let consumer = ReceiptConsumer::new(fixture.state.finalizer.clone());

    let mut delivery = Delivery {
        subject: "nchain.tx.receipt".to_string(),
        payload: serde_json::to_vec(&tx).unwrap(),
        attempt: 1,
    };

    // Not mined yet: wait for the ack window first, nack once redelivered.
    assert_eq!(consumer.handle(&delivery).await, Disposition::AwaitRedelivery);
    delivery.attempt = 2;
    assert_eq!(consumer.handle(&delivery).await, Disposition::Nack);

    let hash = tx.hash.clone().unwrap();
    fixture.adapter.mine(&hash, receipt(&hash, None));
    assert_eq!(consumer.handle(&delivery).await, Disposition::Ack);

    let malformed = Delivery {
        subject: "nchain.tx.receipt".to_string(),
        payload: b"not json".to_vec(),
        attempt: 1,
    };
    assert_eq!(consumer.handle(&malformed).await, Disposition::Ack);

    let stored = fixture.store.get(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TxStatus::Success);
}
