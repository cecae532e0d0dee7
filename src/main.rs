//! nchain service.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                        NCHAIN                        │
//!                       │                                                      │
//!   HTTP client ───────▶│  api ──▶ DaemonRegistry ──▶ daemon (one per network) │◀── chain node
//!                       │   │                            │  stream | poll      │    (ws / rpc)
//!                       │   │                            ▼                     │
//!                       │   │                     cache status:<id>            │
//!                       │   │                     publish block.finalized ─┐   │
//!                       │   ▼                                              │   │
//!                       │  TxPipeline ──▶ nonce ──▶ sign ──▶ broadcast ────┼──▶│── chain node
//!                       │      │                                           │   │
//!                       │      └─ publish tx.receipt ──┐                   │   │
//!                       │                              ▼                   ▼   │
//!                       │                 Dispatcher ──▶ Finalizer (receipts)  │
//!                       │                                                      │
//!                       │  config (hot reload) · observability · lifecycle     │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::stream::BoxStream;
use tokio::net::TcpListener;

use nchain::api::{self, AppState};
use nchain::chain::AdapterCache;
use nchain::config::{load_config, Backend, ConfigWatcher, NchainConfig, SharedConfig};
use nchain::lifecycle::{signals, Shutdown};
use nchain::observability::{init_logging, init_metrics};
use nchain::pubsub::{BroadcastPublisher, Dispatcher, Message, Publisher, RedisPublisher, Subjects};
use nchain::store::{Account, MemoryStore};
use nchain::tx::{BlockFinalizedHandler, ReceiptConsumer};

const CONFIG_ENV: &str = "NCHAIN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "nchain.toml";

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn load_accounts(config: &NchainConfig) -> MemoryStore {
    let store = MemoryStore::new();
    for account in &config.accounts {
        match Account::from_config(account) {
            Ok(loaded) => {
                tracing::info!(
                    account_id = %loaded.id,
                    network_id = %loaded.network_id,
                    address = %loaded.address(),
                    "Signer loaded"
                );
                store.add_account(loaded);
            }
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "Failed to load signer; skipping");
            }
        }
    }
    store
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    let config = load_config(&path)?;

    init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        networks = config.networks.len(),
        "nchain starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shared: SharedConfig = Arc::new(ArcSwap::from_pointee(config.clone()));

    // Backends
    let cache = nchain::cache::connect(&config.cache).await?;
    let subjects = Subjects::new(config.pubsub.subject_prefix.clone());
    let (publisher, messages): (Arc<dyn Publisher>, BoxStream<'static, Message>) =
        match config.pubsub.backend {
            Backend::Memory => {
                let publisher = BroadcastPublisher::default();
                let messages = publisher.stream();
                (Arc::new(publisher) as Arc<dyn Publisher>, messages)
            }
            Backend::Redis => {
                let publisher = RedisPublisher::connect(&config.pubsub.redis_url).await?;
                let messages = publisher
                    .stream(&[subjects.block_finalized(), subjects.tx_receipt()])
                    .await?;
                (Arc::new(publisher) as Arc<dyn Publisher>, messages)
            }
        };

    let store = Arc::new(load_accounts(&config));
    let adapters = Arc::new(AdapterCache::new(shared.clone()));
    let state = AppState::build(shared.clone(), adapters, cache, publisher, store);

    let shutdown = Arc::new(Shutdown::new());
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    // Finalization consumers
    let dispatcher = Dispatcher::from_config(&config.pubsub)
        .route(
            subjects.block_finalized(),
            Arc::new(BlockFinalizedHandler::new(state.finalizer.clone())),
        )
        .route(
            subjects.tx_receipt(),
            Arc::new(ReceiptConsumer::new(state.finalizer.clone())),
        );
    let dispatcher_task = tokio::spawn(dispatcher.run(messages, shutdown.subscribe()));

    for network in config.networks.iter().filter(|n| n.enabled) {
        state.registry.require(network);
    }

    // The watcher stops when dropped, so keep it alive until exit.
    let _watcher = match ConfigWatcher::new(&path, shared.clone()).run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            None
        }
    };

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let router = api::router(
        state.clone(),
        Duration::from_secs(config.server.request_timeout_secs),
    );
    let served = api::serve(listener, router, shutdown.subscribe()).await;

    shutdown.trigger();
    state.registry.shutdown_all();
    if let Err(e) = dispatcher_task.await {
        tracing::error!(error = %e, "Dispatcher task failed");
    }
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}
