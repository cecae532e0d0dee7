//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Chain call:
//!     → timeouts.rs (every RPC has a deadline)
//!     → on failure: backoff.rs (delay before the daemon reconnects)
//! ```

pub mod backoff;
pub mod timeouts;

pub use backoff::RetryPolicy;
