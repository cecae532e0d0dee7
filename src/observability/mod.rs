//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! daemon, nonce, tx, pubsub
//!     → logging.rs (tracing events, pretty or JSON)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint
//! ```
//!
//! Recording a metric without an installed recorder is a no-op, so tests
//! never need to initialize this module.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
