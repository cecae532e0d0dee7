//! Shared fixtures for integration tests: a scriptable chain adapter, a
//! recording publisher and a ready-wired service.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolValue;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use nchain::api::AppState;
use nchain::cache::MemoryCache;
use nchain::chain::types::{EthereumHeader, SignedTx};
use nchain::chain::{
    AdapterSource, Capability, ChainAdapter, ChainError, ChainFamily, ChainResult, HeaderEvent,
    HeaderStream, NetworkId, Receipt, TxParams, Wallet,
};
use nchain::config::{NchainConfig, NetworkConfig, SharedConfig};
use nchain::pubsub::{PublishError, Publisher};
use nchain::store::{Account, MemoryStore};

/// Anvil's first dev account.
pub const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const ZERO_GAS_ERROR: &str =
    "not enough gas to cover minimal cost of the transaction (minimal: 21000, got: 0)";

pub fn eth_header(number: u64, timestamp: u64) -> HeaderEvent {
    HeaderEvent::Ethereum(EthereumHeader {
        number,
        hash: format!("0x{:064x}", number),
        parent_hash: format!("0x{:064x}", number.saturating_sub(1)),
        timestamp,
    })
}

/// Chain adapter whose every answer is scripted by the test.
#[derive(Default)]
pub struct StubAdapter {
    /// Serve `subscribe_headers` from `stream_sessions`; otherwise report
    /// websocket unsupported.
    pub streaming: bool,
    /// One scripted item list per subscription. Each stream stays open after
    /// its items; once the scripts run out a subscription yields nothing.
    pub stream_sessions: Mutex<VecDeque<Vec<ChainResult<HeaderEvent>>>>,
    /// Consumed one per poll; the last one repeats.
    pub poll_headers: Mutex<VecDeque<HeaderEvent>>,
    last_polled: Mutex<Option<HeaderEvent>>,
    pub polls: AtomicUsize,
    pub subscribes: AtomicUsize,

    /// `chain_id` fails with a transport error this many more times.
    pub chain_id_failures: AtomicUsize,
    pub chain_id_calls: AtomicUsize,

    /// Mined transaction count reported for every address.
    pub mined_nonce: AtomicU64,
    pub nonce_reads: AtomicUsize,

    /// Consumed one per broadcast; an empty queue means success.
    pub broadcast_errors: Mutex<VecDeque<String>>,
    pub broadcasts: AtomicUsize,
    pub signed: Mutex<Vec<TxParams>>,

    pub receipts: Mutex<HashMap<String, Receipt>>,
    /// Answer `name()`, `symbol()` and `decimals()` like an ERC-20.
    pub token: Option<(String, String, u8)>,
}

impl StubAdapter {
    pub fn polling(headers: impl IntoIterator<Item = HeaderEvent>) -> Self {
        Self {
            poll_headers: Mutex::new(headers.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn streaming(headers: impl IntoIterator<Item = HeaderEvent>) -> Self {
        Self::scripted_streams([headers.into_iter().map(Ok).collect()])
    }

    pub fn scripted_streams(sessions: impl IntoIterator<Item = Vec<ChainResult<HeaderEvent>>>) -> Self {
        Self {
            streaming: true,
            stream_sessions: Mutex::new(sessions.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn with_chain_id_failures(self, failures: usize) -> Self {
        self.chain_id_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn with_mined_nonce(self, nonce: u64) -> Self {
        self.mined_nonce.store(nonce, Ordering::SeqCst);
        self
    }

    pub fn with_token(name: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            token: Some((name.to_string(), symbol.to_string(), decimals)),
            ..Default::default()
        }
    }

    pub fn fail_broadcasts(&self, errors: &[&str]) {
        let mut queue = self.broadcast_errors.lock().unwrap();
        queue.extend(errors.iter().map(|e| e.to_string()));
    }

    pub fn mine(&self, hash: &str, receipt: Receipt) {
        self.receipts.lock().unwrap().insert(hash.to_string(), receipt);
    }

    pub fn signed_gas(&self) -> Vec<u64> {
        self.signed.lock().unwrap().iter().map(|p| p.gas).collect()
    }
}

#[async_trait]
impl ChainAdapter for StubAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Ethereum
    }

    fn rpc_url(&self) -> Option<&str> {
        Some("http://stub")
    }

    fn websocket_url(&self) -> Option<&str> {
        self.streaming.then_some("ws://stub")
    }

    async fn dial_json_rpc(&self, method: &str, _params: Value) -> ChainResult<Value> {
        Err(ChainError::Rpc {
            code: -32601,
            message: format!("{} not scripted", method),
        })
    }

    async fn chain_id(&self) -> ChainResult<String> {
        self.chain_id_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .chain_id_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ChainError::Transport("connection refused".to_string()));
        }
        Ok("31337".to_string())
    }

    async fn block_header(&self) -> ChainResult<HeaderEvent> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.poll_headers.lock().unwrap().pop_front();
        let mut last = self.last_polled.lock().unwrap();
        if let Some(header) = next {
            *last = Some(header);
        }
        last.clone()
            .ok_or_else(|| ChainError::Transport("no header scripted".to_string()))
    }

    async fn subscribe_headers(&self) -> ChainResult<HeaderStream> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if !self.streaming {
            return Err(ChainError::Unsupported(Capability::Websocket));
        }
        let items = self.stream_sessions.lock().unwrap().pop_front().unwrap_or_default();
        Ok(stream::iter(items).chain(stream::pending()).boxed())
    }

    async fn transaction_count(&self, _address: Address) -> ChainResult<u64> {
        self.nonce_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.mined_nonce.load(Ordering::SeqCst))
    }

    async fn tx_receipt(&self, hash: &str) -> ChainResult<Option<Receipt>> {
        Ok(self.receipts.lock().unwrap().get(hash).cloned())
    }

    async fn call(&self, _to: Address, data: Bytes) -> ChainResult<Bytes> {
        let Some((name, symbol, decimals)) = &self.token else {
            return Err(ChainError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
            });
        };
        let encoded = match data.get(..4) {
            Some([0x06, 0xfd, 0xde, 0x03]) => name.clone().abi_encode(),
            Some([0x95, 0xd8, 0x9b, 0x41]) => symbol.clone().abi_encode(),
            Some([0x31, 0x3c, 0xe5, 0x67]) => U256::from(*decimals).abi_encode(),
            _ => return Err(ChainError::Decode("unknown selector".to_string())),
        };
        Ok(Bytes::from(encoded))
    }

    async fn sign_tx(&self, _wallet: &Wallet, params: &TxParams) -> ChainResult<SignedTx> {
        self.signed.lock().unwrap().push(params.clone());
        Ok(SignedTx {
            hash: format!("0x{:032x}{:032x}", params.nonce, params.gas),
            raw: Bytes::from(params.nonce.to_be_bytes().to_vec()),
        })
    }

    async fn broadcast_tx(&self, tx: &SignedTx) -> ChainResult<String> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        match self.broadcast_errors.lock().unwrap().pop_front() {
            Some(error) => Err(ChainError::Broadcast(error)),
            None => Ok(tx.hash.clone()),
        }
    }
}

/// Every network resolves to the same adapter.
pub struct StaticSource {
    adapter: Arc<StubAdapter>,
    pub reloads: AtomicUsize,
}

impl StaticSource {
    pub fn new(adapter: Arc<StubAdapter>) -> Self {
        Self {
            adapter,
            reloads: AtomicUsize::new(0),
        }
    }
}

impl AdapterSource for StaticSource {
    fn adapter(&self, _network: &NetworkId) -> ChainResult<Arc<dyn ChainAdapter>> {
        let adapter: Arc<dyn ChainAdapter> = self.adapter.clone();
        Ok(adapter)
    }

    fn reload(&self, network: &NetworkId) -> ChainResult<Arc<dyn ChainAdapter>> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.adapter(network)
    }
}

/// Publisher that keeps every message.
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingPublisher {
    pub fn on(&self, subject: &str) -> Vec<Value> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.messages.lock().unwrap().push((subject.to_string(), payload));
        Ok(())
    }
}

pub fn network(id: NetworkId) -> NetworkConfig {
    NetworkConfig {
        id,
        name: "devnet".to_string(),
        family: ChainFamily::Ethereum,
        chain_id: Some("31337".to_string()),
        rpc_url: Some("http://stub".to_string()),
        websocket_url: None,
        enabled: true,
    }
}

/// A service wired around one stub adapter, one network and one
/// application-scoped signer.
pub struct Fixture {
    pub state: AppState,
    pub adapter: Arc<StubAdapter>,
    pub source: Arc<StaticSource>,
    pub cache: Arc<MemoryCache>,
    pub publisher: Arc<RecordingPublisher>,
    pub store: Arc<MemoryStore>,
    pub network: NetworkConfig,
    pub account: Account,
    pub application_id: Uuid,
}

impl Fixture {
    pub fn new(adapter: StubAdapter) -> Self {
        Self::with_config(adapter, |_| {})
    }

    pub fn with_config(adapter: StubAdapter, tune: impl FnOnce(&mut NchainConfig)) -> Self {
        let network = network(NetworkId::new());
        let application_id = Uuid::new_v4();
        let account = Account {
            id: Uuid::new_v4(),
            network_id: network.id.clone(),
            application_id: Some(application_id),
            user_id: None,
            wallet: Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap(),
        };

        let mut config = NchainConfig {
            networks: vec![network.clone()],
            ..Default::default()
        };
        config.daemon.poll_interval_ms = 10;
        config.daemon.backoff_initial_ms = 10;
        config.daemon.backoff_ceiling_ms = 40;
        tune(&mut config);
        let shared: SharedConfig = Arc::new(ArcSwap::from_pointee(config));

        let adapter = Arc::new(adapter);
        let source = Arc::new(StaticSource::new(adapter.clone()));
        let cache = Arc::new(MemoryCache::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(MemoryStore::with_accounts([account.clone()]));

        let state = AppState::build(
            shared,
            source.clone(),
            cache.clone(),
            publisher.clone(),
            store.clone(),
        );

        Self {
            state,
            adapter,
            source,
            cache,
            publisher,
            store,
            network,
            account,
            application_id,
        }
    }

    /// Cache key holding the fixture signer's next nonce.
    pub fn nonce_key(&self) -> String {
        format!("nchain.tx.nonce.{:#x}:{}", self.account.address(), self.network.id)
    }

    /// A valid request from the fixture signer.
    pub fn request(&self) -> nchain::tx::TransactionRequest {
        nchain::tx::TransactionRequest {
            network_id: self.network.id.clone(),
            application_id: Some(self.application_id),
            account_id: Some(self.account.id),
            to: Some(Address::repeat_byte(0x42)),
            gas: 21_000,
            ..Default::default()
        }
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
