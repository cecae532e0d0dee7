//! One network status daemon: a feed task that streams or polls headers and
//! an ingest task that folds them into the published snapshot.
//!
//! # State Transitions
//! ```text
//! Configuring → Streaming ⇄ Polling → ShuttingDown → Stopped
//!
//! Streaming → Polling:   adapter reports websocket unsupported
//! Polling → Streaming:   adapter reports JSON-RPC unsupported
//! any error otherwise:   back off, reload the adapter, retry same mode
//! ```

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::cache::CacheStore;
use crate::chain::adapter::{AdapterSource, ChainAdapter};
use crate::chain::types::{Capability, ChainError, ChainResult, HeaderEvent, NetworkId};
use crate::config::schema::{DaemonConfig, NetworkConfig};
use crate::daemon::status::{Ingestor, NetworkStatus, StatusUpdate};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::observability::metrics;
use crate::pubsub::{publish_json, Publisher, Subjects};
use crate::resilience::RetryPolicy;

/// Daemon lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Configuring = 0,
    Streaming = 1,
    Polling = 2,
    ShuttingDown = 3,
    Stopped = 4,
}

impl From<u8> for DaemonState {
    fn from(val: u8) -> Self {
        match val {
            1 => DaemonState::Streaming,
            2 => DaemonState::Polling,
            3 => DaemonState::ShuttingDown,
            4 => DaemonState::Stopped,
            _ => DaemonState::Configuring,
        }
    }
}

impl DaemonState {
    pub fn as_str(self) -> &'static str {
        match self {
            DaemonState::Configuring => "configuring",
            DaemonState::Streaming => "streaming",
            DaemonState::Polling => "polling",
            DaemonState::ShuttingDown => "shutting_down",
            DaemonState::Stopped => "stopped",
        }
    }
}

/// Everything a daemon needs from the rest of the process.
#[derive(Clone)]
pub struct DaemonDeps {
    pub adapters: Arc<dyn AdapterSource>,
    pub cache: Arc<dyn CacheStore>,
    pub publisher: Arc<dyn Publisher>,
    pub subjects: Subjects,
    pub config: DaemonConfig,
}

struct Inner {
    network_id: NetworkId,
    state: AtomicU8,
    attempts: AtomicU32,
    snapshot: ArcSwap<NetworkStatus>,
    shutdown: Shutdown,
}

/// Cheap handle to a running daemon.
#[derive(Clone)]
pub struct DaemonHandle {
    inner: Arc<Inner>,
}

impl DaemonHandle {
    pub fn network_id(&self) -> &NetworkId {
        &self.inner.network_id
    }

    pub fn state(&self) -> DaemonState {
        DaemonState::from(self.inner.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DaemonState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// Move to `state` unless the daemon is already shutting down or stopped.
    fn advance(&self, state: DaemonState) -> bool {
        self.inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match DaemonState::from(current) {
                    DaemonState::ShuttingDown | DaemonState::Stopped => None,
                    _ => Some(state as u8),
                }
            })
            .is_ok()
    }

    /// Reconnect attempts since the last good frame or poll.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    /// Copy of the latest snapshot, stamped with the current state.
    pub fn status(&self) -> NetworkStatus {
        let mut status = NetworkStatus::clone(&self.inner.snapshot.load());
        status.state = Some(self.state().as_str().to_string());
        status
    }

    /// Signal the daemon to stop. Only the first call has any effect.
    pub fn shutdown(&self) -> bool {
        if !self.inner.shutdown.trigger() {
            return false;
        }
        let _ = self
            .inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (DaemonState::from(current) != DaemonState::Stopped)
                    .then_some(DaemonState::ShuttingDown as u8)
            });
        tracing::info!(network_id = %self.network_id(), "Daemon shutting down");
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_triggered()
    }

    pub fn same_daemon(&self, other: &DaemonHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for DaemonHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonHandle")
            .field("network_id", self.network_id())
            .field("state", &self.state())
            .finish()
    }
}

/// Start a daemon for `network` on the current runtime.
pub fn spawn(network: &NetworkConfig, deps: DaemonDeps) -> DaemonHandle {
    let status = NetworkStatus::new(network.chain_id.clone().unwrap_or_default());
    let handle = DaemonHandle {
        inner: Arc::new(Inner {
            network_id: network.id.clone(),
            state: AtomicU8::new(DaemonState::Configuring as u8),
            attempts: AtomicU32::new(0),
            snapshot: ArcSwap::from_pointee(status),
            shutdown: Shutdown::new(),
        }),
    };

    tokio::spawn(run(handle.clone(), deps));
    handle
}

async fn run(handle: DaemonHandle, deps: DaemonDeps) {
    let network_id = handle.network_id().clone();
    tracing::info!(network_id = %network_id, "Daemon starting");

    let Some(status) = configure(&handle, &deps).await else {
        handle.set_state(DaemonState::Stopped);
        tracing::info!(network_id = %network_id, "Daemon stopped while configuring");
        return;
    };

    let (tx, rx) = mpsc::channel(deps.config.queue_capacity.max(1));
    let ingestor = Ingestor::new(
        network_id.clone(),
        status,
        deps.config.max_recent_blocks,
        deps.config.min_recent_blocks,
    );
    let ingest_task = tokio::spawn(ingest(handle.clone(), deps.clone(), ingestor, rx));

    feed(&handle, &deps, tx).await;

    if let Err(e) = ingest_task.await {
        tracing::error!(network_id = %network_id, error = %e, "Ingest task failed");
    }
    handle.set_state(DaemonState::Stopped);
    tracing::info!(network_id = %network_id, "Daemon stopped");
}

async fn resolve_chain_id(deps: &DaemonDeps, network_id: &NetworkId) -> ChainResult<String> {
    deps.adapters.adapter(network_id)?.chain_id().await
}

/// Resolve the chain id when the config does not pin one, backing off and
/// reloading the adapter between failures. `None` if cancelled first.
async fn configure(handle: &DaemonHandle, deps: &DaemonDeps) -> Option<NetworkStatus> {
    let network_id = handle.network_id();
    let mut status = handle.status();
    if !status.chain_id.is_empty() {
        return Some(status);
    }

    let mut signal = handle.inner.shutdown.subscribe();
    let mut policy = RetryPolicy::for_daemon(&deps.config);
    loop {
        let resolved = tokio::select! {
            _ = signal.cancelled() => return None,
            resolved = resolve_chain_id(deps, network_id) => resolved,
        };
        match resolved {
            Ok(chain_id) => {
                status.chain_id = chain_id;
                break;
            }
            Err(e) if e.is_unsupported() => {
                tracing::warn!(network_id = %network_id, error = %e, "Chain id unavailable");
                break;
            }
            Err(e) => {
                if !back_off(handle, deps, &mut policy, &mut signal, &e).await {
                    return None;
                }
            }
        }
    }

    handle.inner.attempts.store(0, Ordering::Relaxed);
    handle.inner.snapshot.store(Arc::new(status.clone()));
    Some(status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Streaming,
    Polling,
}

/// Produce headers until cancelled. Never returns an error: every failure is
/// either a mode switch or a backoff.
async fn feed(handle: &DaemonHandle, deps: &DaemonDeps, tx: mpsc::Sender<HeaderEvent>) {
    let network_id = handle.network_id().clone();
    let network_label = network_id.to_string();
    let mut signal = handle.inner.shutdown.subscribe();
    let mut policy = RetryPolicy::for_daemon(&deps.config);
    let poll_interval = Duration::from_millis(deps.config.poll_interval_ms);
    let mut mode = Mode::Streaming;
    let mut unsupported_in_a_row = 0u8;

    loop {
        if signal.is_cancelled() {
            return;
        }

        let result = match deps.adapters.adapter(&network_id) {
            Ok(adapter) => {
                let state = match mode {
                    Mode::Streaming => DaemonState::Streaming,
                    Mode::Polling => DaemonState::Polling,
                };
                if !handle.advance(state) {
                    return;
                }
                metrics::record_daemon_mode(&network_label, mode == Mode::Streaming);

                match mode {
                    Mode::Streaming => {
                        stream_headers(adapter.as_ref(), &tx, &mut signal, &mut policy).await
                    }
                    Mode::Polling => {
                        poll_headers(adapter.as_ref(), &tx, &mut signal, &mut policy, poll_interval).await
                    }
                }
            }
            Err(e) => Err(e),
        };

        handle.inner.attempts.store(policy.attempts(), Ordering::Relaxed);

        let err = match result {
            Ok(()) => return,
            Err(e) => e,
        };

        let switch = match (&err, mode) {
            (ChainError::Unsupported(Capability::Websocket), Mode::Streaming) => Some(Mode::Polling),
            (ChainError::Unsupported(Capability::JsonRpc), Mode::Polling) => Some(Mode::Streaming),
            _ => None,
        };

        if let Some(next) = switch {
            unsupported_in_a_row += 1;
            tracing::info!(
                network_id = %network_id,
                reason = %err,
                from = ?mode,
                to = ?next,
                "Switching ingestion mode"
            );
            mode = next;
            if unsupported_in_a_row < 2 {
                continue;
            }
            tracing::error!(network_id = %network_id, "Network supports neither streaming nor polling");
        }
        unsupported_in_a_row = 0;

        if !back_off(handle, deps, &mut policy, &mut signal, &err).await {
            return;
        }
    }
}

/// Wait out the next backoff delay and reload the adapter. Returns `false`
/// if cancelled while waiting.
async fn back_off(
    handle: &DaemonHandle,
    deps: &DaemonDeps,
    policy: &mut RetryPolicy,
    signal: &mut ShutdownSignal,
    err: &ChainError,
) -> bool {
    let network_id = handle.network_id();
    let delay = policy.next_delay();
    handle.inner.attempts.store(policy.attempts(), Ordering::Relaxed);
    metrics::record_daemon_reconnect(&network_id.to_string());

    tracing::warn!(
        network_id = %network_id,
        error = %err,
        attempt = policy.attempts(),
        delay_ms = delay.as_millis() as u64,
        "Header feed failed; backing off"
    );

    tokio::select! {
        _ = signal.cancelled() => return false,
        _ = tokio::time::sleep(delay) => {}
    }

    if let Err(e) = deps.adapters.reload(network_id) {
        tracing::warn!(network_id = %network_id, error = %e, "Failed to reload chain adapter");
    }
    true
}

/// Hand a header to the ingest task. Returns `false` when the daemon is done.
async fn forward(
    tx: &mpsc::Sender<HeaderEvent>,
    signal: &mut ShutdownSignal,
    header: HeaderEvent,
) -> bool {
    tokio::select! {
        _ = signal.cancelled() => false,
        sent = tx.send(header) => sent.is_ok(),
    }
}

async fn stream_headers(
    adapter: &dyn ChainAdapter,
    tx: &mpsc::Sender<HeaderEvent>,
    signal: &mut ShutdownSignal,
    policy: &mut RetryPolicy,
) -> ChainResult<()> {
    let mut headers = tokio::select! {
        _ = signal.cancelled() => return Ok(()),
        opened = adapter.subscribe_headers() => opened?,
    };
    tracing::debug!("Header stream opened");

    loop {
        let next = tokio::select! {
            _ = signal.cancelled() => return Ok(()),
            next = headers.next() => next,
        };

        match next {
            None => return Err(ChainError::Transport("header stream closed".to_string())),
            Some(Ok(header)) => {
                policy.reset();
                if !forward(tx, signal, header).await {
                    return Ok(());
                }
            }
            Some(Err(ChainError::Decode(reason))) => {
                tracing::warn!(reason = %reason, "Skipping undecodable frame");
            }
            Some(Err(e)) => return Err(e),
        }
    }
}

async fn poll_headers(
    adapter: &dyn ChainAdapter,
    tx: &mpsc::Sender<HeaderEvent>,
    signal: &mut ShutdownSignal,
    policy: &mut RetryPolicy,
    interval: Duration,
) -> ChainResult<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_identity: Option<String> = None;

    loop {
        tokio::select! {
            _ = signal.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let polled = tokio::select! {
            _ = signal.cancelled() => return Ok(()),
            polled = adapter.block_header() => polled,
        };

        match polled {
            Ok(header) => {
                policy.reset();
                if last_identity.as_deref() == Some(header.identity()) {
                    continue;
                }
                last_identity = Some(header.identity().to_string());
                if !forward(tx, signal, header).await {
                    return Ok(());
                }
            }
            Err(ChainError::Decode(reason)) => {
                tracing::warn!(reason = %reason, "Skipping undecodable block");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fold headers into the snapshot, in arrival order, until the feed ends or
/// the daemon is cancelled.
async fn ingest(
    handle: DaemonHandle,
    deps: DaemonDeps,
    mut ingestor: Ingestor,
    mut rx: mpsc::Receiver<HeaderEvent>,
) {
    let network_id = handle.network_id().clone();
    let network_label = network_id.to_string();
    let status_key = format!("status:{}", network_id);
    let status_ttl = Duration::from_secs(deps.config.status_ttl_secs);
    let mut signal = handle.inner.shutdown.subscribe();

    loop {
        let header = tokio::select! {
            biased;
            _ = signal.cancelled() => break,
            header = rx.recv() => match header {
                Some(header) => header,
                None => break,
            },
        };

        let Some(event) = ingestor.apply(&header) else {
            continue;
        };
        metrics::record_block_ingested(&network_label);

        let subject = deps.subjects.block_finalized();
        if let Err(e) = publish_json(deps.publisher.as_ref(), &subject, &event).await {
            tracing::warn!(network_id = %network_id, error = %e, "Failed to publish block finalized");
        }

        let mut status = ingestor.status().clone();
        status.state = Some(handle.state().as_str().to_string());

        match serde_json::to_string(&status) {
            Ok(json) => {
                if let Err(e) = deps.cache.set(&status_key, &json, status_ttl).await {
                    metrics::record_cache_error("status");
                    tracing::warn!(network_id = %network_id, error = %e, "Failed to cache network status");
                }
            }
            Err(e) => tracing::warn!(network_id = %network_id, error = %e, "Failed to encode network status"),
        }

        let update = StatusUpdate {
            network_id: network_id.clone(),
            status: status.clone(),
        };
        if let Err(e) = publish_json(deps.publisher.as_ref(), &deps.subjects.network_status(), &update).await {
            tracing::warn!(network_id = %network_id, error = %e, "Failed to publish network status");
        }

        tracing::debug!(network_id = %network_id, block = event.block, "Block ingested");
        handle.inner.snapshot.store(Arc::new(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            DaemonState::Configuring,
            DaemonState::Streaming,
            DaemonState::Polling,
            DaemonState::ShuttingDown,
            DaemonState::Stopped,
        ] {
            assert_eq!(DaemonState::from(state as u8), state);
        }
        assert_eq!(DaemonState::from(200), DaemonState::Configuring);
    }

    fn idle_handle() -> DaemonHandle {
        DaemonHandle {
            inner: Arc::new(Inner {
                network_id: NetworkId::new(),
                state: AtomicU8::new(DaemonState::Configuring as u8),
                attempts: AtomicU32::new(0),
                snapshot: ArcSwap::from_pointee(NetworkStatus::new("1")),
                shutdown: Shutdown::new(),
            }),
        }
    }

    #[test]
    fn test_mode_change_does_not_undo_shutdown() {
        let handle = idle_handle();
        assert!(handle.advance(DaemonState::Streaming));
        assert!(handle.advance(DaemonState::Polling));
        assert_eq!(handle.state(), DaemonState::Polling);

        assert!(handle.shutdown());
        assert!(!handle.advance(DaemonState::Streaming));
        assert_eq!(handle.state(), DaemonState::ShuttingDown);

        handle.set_state(DaemonState::Stopped);
        assert!(!handle.advance(DaemonState::Polling));
        assert!(!handle.shutdown());
        assert_eq!(handle.state(), DaemonState::Stopped);
    }
}
