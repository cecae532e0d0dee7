//! Thin HTTP surface over the daemon registry and the transaction pipeline.
//!
//! # Routes
//! ```text
//! GET    /status                     service and daemon overview
//! GET    /networks/{id}/status       cached NetworkStatus (?force=true reads the chain)
//! POST   /networks/{id}/daemon       require a daemon (202)
//! DELETE /networks/{id}/daemon       evict a daemon (204 / 404)
//! POST   /transactions               sign and broadcast (201)
//! GET    /transactions/{id}          transaction record
//! ```
//!
//! Errors are returned as `{"errors": [{"message": ...}]}`.

pub mod error;
pub mod handlers;
pub mod state;

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::lifecycle::ShutdownSignal;

pub use error::ApiError;
pub use state::AppState;

use self::handlers::*;

/// Build the router with all middleware layers.
#[allow(deprecated)]
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/networks/{id}/status", get(get_network_status))
        .route("/networks/{id}/daemon", post(require_daemon).delete(evict_daemon))
        .route("/transactions", post(create_transaction))
        .route("/transactions/{id}", get(get_transaction))
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Serve `router` until `shutdown` fires, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
