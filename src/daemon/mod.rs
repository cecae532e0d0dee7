//! Network status daemons.
//!
//! # Data Flow
//! ```text
//! DaemonRegistry::require(network)
//!     → monitor.rs feed task
//!         Streaming: adapter.subscribe_headers() ──┐
//!         Polling:   adapter.block_header() / tick ┤
//!                                                  ▼
//!                                  bounded mpsc queue (queue_capacity)
//!                                                  ▼
//!       monitor.rs ingest task → status.rs Ingestor::apply
//!           → publish <prefix>.block.finalized
//!           → cache status:<network> (TTL)
//!           → publish <prefix>.network.status
//!           → swap snapshot (read by DaemonHandle::status)
//! ```

pub mod monitor;
pub mod registry;
pub mod status;

pub use monitor::{DaemonDeps, DaemonHandle, DaemonState};
pub use registry::{DaemonError, DaemonRegistry};
pub use status::{Ingestor, NetworkStatus, RecentBlockWindow};
