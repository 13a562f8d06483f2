use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use relay_channels::{ChannelError, OutboundMessage};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::{check_auth, error_response};
use crate::app::AppState;

/// POST /send/{channel}
///
/// Body is an [`OutboundMessage`]. Returns the id of every wire call made,
/// in chain order.
pub async fn send_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    Json(msg): Json<OutboundMessage>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !check_auth(&state, &headers) {
        warn!(channel = %channel, "send rejected: bad or missing bearer token");
        return Err(error_response(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    let request_id = Uuid::new_v4();
    let channels = state.channels.read().await;
    let adapter = channels.get(&channel).ok_or_else(|| {
        error_response(StatusCode::NOT_FOUND, format!("unknown channel: {channel}"))
    })?;

    let receipt = adapter.send(&msg).await.map_err(|e| {
        warn!(%request_id, channel = %channel, error = %e, "send failed");
        let status = match e {
            ChannelError::Validation(_) => StatusCode::BAD_REQUEST,
            ChannelError::ConfigError(_) | ChannelError::Unsupported(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::BAD_GATEWAY,
        };
        error_response(status, e.to_string())
    })?;

    info!(
        %request_id,
        channel = %channel,
        recipient = %msg.recipient_id,
        calls = receipt.len(),
        "message sent"
    );
    Ok(Json(json!({
        "request_id": request_id,
        "message_ids": receipt.message_ids,
        "message_id": receipt.last_message_id(),
    })))
}
