use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use relay_discord::{dispatch_payload, DiscordError, GatewayPayload};
use serde_json::{json, Value};
use tracing::warn;

use super::{check_auth, error_response};
use crate::app::AppState;

/// POST /discord/dispatch
///
/// Accepts a Discord gateway dispatch frame forwarded by the process that
/// holds the gateway session, and feeds it to the inbound normalizer.
pub async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<GatewayPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !check_auth(&state, &headers) {
        warn!("dispatch rejected: bad or missing bearer token");
        return Err(error_response(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    let bot = state
        .discord
        .as_ref()
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "discord is not configured"))?;

    match dispatch_payload(bot, state.sink.as_ref(), &payload).await {
        Ok(dispatched) => Ok(Json(json!({ "dispatched": dispatched }))),
        Err(e @ DiscordError::Decode { .. }) => {
            Err(error_response(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e @ DiscordError::Unidentified(_)) => {
            Err(error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
        Err(e) => Err(error_response(StatusCode::BAD_GATEWAY, e.to_string())),
    }
}
