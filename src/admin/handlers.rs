use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::admin::AdminState;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
    pub in_flight: usize,
    pub open_circuits: usize,
}

#[derive(Serialize)]
pub struct BreakerState {
    pub backend: String,
    pub state: CircuitState,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let dispatcher = &state.dispatcher;
    let open_circuits = dispatcher
        .circuit_breakers()
        .iter()
        .filter(|b| b.state == CircuitState::Open)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if dispatcher.is_closing() { "draining" } else { "operational" },
        uptime_secs: dispatcher.uptime().as_secs(),
        routes: dispatcher.config().routes.len(),
        in_flight: dispatcher.in_flight(),
        open_circuits,
    })
}

pub async fn list_circuit_breakers(State(state): State<AdminState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.dispatcher.circuit_breakers())
}

pub async fn get_circuit_breaker(
    State(state): State<AdminState>,
    Path(backend): Path<String>,
) -> Json<BreakerState> {
    let circuit = state.dispatcher.circuit_breaker_state(&backend);
    Json(BreakerState { backend, state: circuit })
}

pub async fn reset_circuit_breaker(
    State(state): State<AdminState>,
    Path(backend): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    if state.dispatcher.reset_circuit_breaker(&backend) {
        (StatusCode::OK, Json(json!({ "backend": backend, "reset": true })))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "backend": backend, "reset": false })))
    }
}

pub async fn reset_rate_limit(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    if state.dispatcher.reset_rate_limit(&key) {
        tracing::info!(key = %key, "Rate limit bucket reset");
        (StatusCode::OK, Json(json!({ "key": key, "reset": true })))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "key": key, "reset": false })))
    }
}

pub async fn reset_all_rate_limits(State(state): State<AdminState>) -> Json<serde_json::Value> {
    state.dispatcher.reset_all_rate_limits();
    Json(json!({ "reset": "all" }))
}
