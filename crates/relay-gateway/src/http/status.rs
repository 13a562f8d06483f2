use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /status: message counters for every bot over the trailing window.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "window_secs": relay_core::stats::WINDOW_SECS,
        "bots": state.stats.snapshot(),
    }))
}
