//! Shared handler state and the wiring that produces it.

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::chain::adapter::AdapterSource;
use crate::config::SharedConfig;
use crate::daemon::{DaemonDeps, DaemonRegistry};
use crate::nonce::NonceAllocator;
use crate::pubsub::{Publisher, Subjects};
use crate::store::{MemoryStore, TransactionStore};
use crate::tx::{Finalizer, PipelineDeps, TxPipeline};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
    pub registry: Arc<DaemonRegistry>,
    pub pipeline: Arc<TxPipeline>,
    pub finalizer: Arc<Finalizer>,
    pub transactions: Arc<dyn TransactionStore>,
}

impl AppState {
    /// Wire the daemon registry, finalizer and transaction pipeline around
    /// one set of backends.
    pub fn build(
        config: SharedConfig,
        adapters: Arc<dyn AdapterSource>,
        cache: Arc<dyn CacheStore>,
        publisher: Arc<dyn Publisher>,
        store: Arc<MemoryStore>,
    ) -> Self {
        let snapshot = config.load_full();
        let subjects = Subjects::new(snapshot.pubsub.subject_prefix.clone());

        let registry = Arc::new(DaemonRegistry::new(DaemonDeps {
            adapters: adapters.clone(),
            cache: cache.clone(),
            publisher: publisher.clone(),
            subjects: subjects.clone(),
            config: snapshot.daemon.clone(),
        }));

        let finalizer = Arc::new(Finalizer::new(
            adapters.clone(),
            store.clone(),
            store.clone(),
            snapshot.finalizer.clone(),
        ));

        let nonces = NonceAllocator::new(cache, subjects.prefix(), &snapshot.nonce);
        let pipeline = Arc::new(TxPipeline::new(PipelineDeps {
            config: config.clone(),
            adapters,
            accounts: store.clone(),
            transactions: store.clone(),
            nonces,
            publisher,
            subjects,
            finalizer: finalizer.clone(),
        }));

        Self {
            config,
            registry,
            pipeline,
            finalizer,
            transactions: store,
        }
    }
}
