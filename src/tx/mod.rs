//! Transaction lifecycle.
//!
//! # Data Flow
//! ```text
//! TransactionRequest
//!     → pipeline.rs validate (scope, network, signer)
//!     → per-signer lock: nonce → sign → persist pending → broadcast
//!         zero-gas rejection → recovery.rs → re-sign → one more broadcast
//!     → publish <prefix>.tx.receipt, Finalizer::track
//!
//! <prefix>.block.finalized / <prefix>.tx.receipt
//!     → consumer.rs → finalize.rs (receipt, latencies, contract, token)
//! ```

pub mod consumer;
pub mod finalize;
pub mod pipeline;
pub mod recovery;
pub mod types;

pub use consumer::{BlockFinalizedHandler, ReceiptConsumer};
pub use finalize::{FetchOutcome, FinalizeError, Finalizer};
pub use pipeline::{PipelineDeps, PipelineError, TxPipeline};
pub use types::{FieldError, Transaction, TransactionRequest, TxStatus};
