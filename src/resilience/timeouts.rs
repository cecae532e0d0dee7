//! Timeout enforcement for chain I/O.
//!
//! Every external call has a deadline; an elapsed deadline is reported as
//! `ChainError::Timeout`, distinct from transport failures.

use std::future::IntoFuture;
use std::time::Duration;

use crate::chain::types::{ChainError, ChainResult};

/// Run `fut` with a deadline.
pub async fn with_timeout<F>(duration: Duration, fut: F) -> ChainResult<F::Output>
where
    F: IntoFuture,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| ChainError::Timeout(duration.as_secs()))
}
