use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health: liveness probe with per-channel status.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let channels: serde_json::Map<String, Value> = state
        .channels
        .read()
        .await
        .statuses()
        .into_iter()
        .map(|(name, status)| (name, json!(status)))
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "channels": channels,
        "feishu": state.config.feishu.is_some(),
    }))
}
