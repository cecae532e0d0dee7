use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::chain::types::NetworkId;
use crate::daemon::NetworkStatus;
use crate::tx::{Transaction, TransactionRequest};

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub force: bool,
}

fn parse_network_id(raw: &str) -> Result<NetworkId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::unprocessable(format!("invalid network id '{}'", raw)))
}

pub async fn get_status(State(state): State<AppState>) -> Json<Value> {
    let daemons: Vec<Value> = state
        .registry
        .network_ids()
        .into_iter()
        .filter_map(|id| state.registry.get(&id))
        .map(|handle| {
            let status = handle.status();
            json!({
                "network_id": handle.network_id(),
                "state": handle.state().as_str(),
                "block": status.block,
                "reconnect_attempts": handle.attempts(),
            })
        })
        .collect();

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
        "networks": state.config.load().networks.len(),
        "daemons": daemons,
    }))
}

pub async fn get_network_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<NetworkStatus>, ApiError> {
    let network_id = parse_network_id(&id)?;
    let status = state.registry.status(&network_id, query.force).await?;
    Ok(Json(status))
}

pub async fn require_daemon(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let network_id = parse_network_id(&id)?;
    let config = state.config.load();
    let network = config
        .network(&network_id)
        .ok_or_else(|| ApiError::not_found(format!("network {} not found", network_id)))?;

    let handle = state.registry.require(network);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "network_id": handle.network_id(),
            "state": handle.state().as_str(),
        })),
    ))
}

pub async fn evict_daemon(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let network_id = parse_network_id(&id)?;
    state.registry.evict(&network_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<TransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let tx = state.pipeline.submit(request).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let id: Uuid = id
        .parse()
        .map_err(|_| ApiError::unprocessable(format!("invalid transaction id '{}'", id)))?;
    state
        .transactions
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("transaction {} not found", id)))
}
