//! Blockchain interaction middleware: per-network status daemons and an
//! ordered sign-and-broadcast transaction pipeline.

// Core subsystems
pub mod chain;
pub mod daemon;
pub mod nonce;
pub mod tx;

// Backends
pub mod cache;
pub mod pubsub;
pub mod store;

// Surfaces
pub mod api;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::NchainConfig;
pub use daemon::DaemonRegistry;
pub use lifecycle::Shutdown;
pub use tx::TxPipeline;
