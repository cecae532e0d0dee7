//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::types::{ChainFamily, NetworkId};

/// Root configuration for the nchain service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NchainConfig {
    /// HTTP surface settings.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Keyed cache store backend (status snapshots, nonces, locks).
    pub cache: CacheConfig,

    /// Pub/sub transport settings.
    pub pubsub: PubSubConfig,

    /// Network status daemon tuning.
    pub daemon: DaemonConfig,

    /// Nonce allocator tuning.
    pub nonce: NonceConfig,

    /// Receipt finalization tuning.
    pub finalizer: FinalizerConfig,

    /// Chain RPC settings shared by every adapter.
    pub rpc: RpcConfig,

    /// Monitored networks.
    pub networks: Vec<NetworkConfig>,

    /// Signing accounts.
    pub accounts: Vec<AccountConfig>,
}

impl NchainConfig {
    /// Look up a network record by id.
    pub fn network(&self, id: &NetworkId) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| &n.id == id)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Storage backend selector shared by the cache and pub/sub sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Redis,
}

/// Cache store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: Backend,
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Pub/sub configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PubSubConfig {
    pub backend: Backend,

    pub redis_url: String,

    /// Prefix for every subject (e.g., "nchain" -> "nchain.block.finalized").
    pub subject_prefix: String,

    /// Seconds a failed delivery waits before the broker redelivers it.
    pub ack_wait_secs: u64,

    /// Maximum deliveries of one message before it is dropped.
    pub max_deliveries: u32,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            subject_prefix: "nchain".to_string(),
            ack_wait_secs: 15,
            max_deliveries: 8,
        }
    }
}

/// What the retry policy does once the backoff exceeds its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CeilingBehavior {
    /// Keep retrying at the ceiling.
    Cap,
    /// Start over from zero delay.
    Reset,
}

/// Network status daemon configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Capacity of the per-daemon inbound header queue.
    pub queue_capacity: usize,

    /// Poll interval when streaming is unsupported, in milliseconds.
    pub poll_interval_ms: u64,

    /// First reconnect delay in milliseconds.
    pub backoff_initial_ms: u64,

    /// Reconnect delay ceiling in milliseconds.
    pub backoff_ceiling_ms: u64,

    pub backoff_on_ceiling: CeilingBehavior,

    /// Maximum headers kept in the recent-block window.
    pub max_recent_blocks: usize,

    /// Minimum headers before average block time is computed.
    pub min_recent_blocks: usize,

    /// TTL of the cached `status:<network>` entry in seconds.
    pub status_ttl_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            poll_interval_ms: 2_500,
            backoff_initial_ms: 100,
            backoff_ceiling_ms: 12_800,
            backoff_on_ceiling: CeilingBehavior::Cap,
            max_recent_blocks: 8,
            min_recent_blocks: 3,
            status_ttl_secs: 3_600,
        }
    }
}

/// Nonce allocator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NonceConfig {
    /// TTL of the cached next-nonce entry in seconds.
    pub ttl_secs: u64,

    /// TTL of the distributed lock in milliseconds.
    pub lock_ttl_ms: u64,

    /// How long a caller waits for the lock before giving up, in milliseconds.
    pub lock_wait_ms: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 5,
            lock_ttl_ms: 5_000,
            lock_wait_ms: 10_000,
        }
    }
}

/// Receipt finalization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FinalizerConfig {
    /// Upper bound for one receipt fetch in seconds.
    pub receipt_timeout_secs: u64,

    /// Token discovery probe interval in seconds.
    pub discovery_interval_secs: u64,

    /// Token discovery give-up deadline in seconds.
    pub discovery_timeout_secs: u64,

    /// Stop tracking a broadcast transaction that has not been mined after
    /// this long and mark it failed.
    pub pending_ttl_secs: u64,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 60,
            discovery_interval_secs: 5,
            discovery_timeout_secs: 60,
            pending_ttl_secs: 3_600,
        }
    }
}

/// Chain RPC configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// RPC request timeout in seconds.
    pub timeout_secs: u64,

    /// Gas price multiplier applied when the request carries no gas price.
    pub gas_price_multiplier: f64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            gas_price_multiplier: 1.0,
        }
    }
}

/// A monitored network.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub id: NetworkId,

    pub name: String,

    pub family: ChainFamily,

    /// Chain id; queried from the chain when absent.
    #[serde(default)]
    pub chain_id: Option<String>,

    /// JSON-RPC endpoint URL.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Websocket endpoint URL for block streaming.
    #[serde(default)]
    pub websocket_url: Option<String>,

    /// Start a status daemon for this network at boot.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A signing account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    pub id: Uuid,

    pub network_id: NetworkId,

    #[serde(default)]
    pub application_id: Option<Uuid>,

    #[serde(default)]
    pub user_id: Option<Uuid>,

    /// Environment variable holding the hex private key.
    pub private_key_env: String,
}
