// src/handlers/health.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::{Value, json};

use crate::{
    state::AppState,
    store::{QuizRepository, Store},
};

fn report(state: &AppState, status: &str) -> Value {
    json!({
        "status": status,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "timestamp": Utc::now(),
        "store": state.store.backend(),
        "cache_enabled": state.filters.is_enabled(),
        "queue_enabled": state.ledger.is_async(),
    })
}

/// Liveness.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(report(&state, "ok"))
}

/// Readiness: the store must answer a trivial query.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.count_pending().await {
        Ok(_) => (StatusCode::OK, Json(report(&state, "ready"))),
        Err(e) => {
            tracing::error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(report(&state, "unavailable")))
        }
    }
}
