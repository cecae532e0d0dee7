//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → NchainConfig (validated)
//!     → shared via Arc<ArcSwap<_>> to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap
//!     → adapter cache re-reads endpoints on the next reload request
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AccountConfig, Backend, CeilingBehavior, DaemonConfig, FinalizerConfig, LogFormat,
    NchainConfig, NetworkConfig, NonceConfig, ObservabilityConfig, PubSubConfig,
};
pub use watcher::{ConfigWatcher, SharedConfig};
