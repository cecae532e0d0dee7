//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every ShutdownSignal resolves → tasks leave their loops
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → process-wide Shutdown::trigger()
//! ```
//!
//! # Design Decisions
//! - One Shutdown per daemon, one for the whole process
//! - Triggering is idempotent: only the first caller observes `true`

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
