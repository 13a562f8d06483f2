pub mod dispatch;
pub mod health;
pub mod send;
pub mod status;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

/// True when no gateway token is configured or the request carries it.
pub(crate) fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    match state.config.gateway.token.as_deref() {
        None | Some("") => true,
        Some(expected) => extract_bearer(headers) == Some(expected),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}
