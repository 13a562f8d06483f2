//! HTTP route for Feishu event subscriptions.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use relay_core::config::FeishuConfig;
use relay_core::stats::StatsRegistry;
use relay_core::EventSink;
use serde_json::json;
use tracing::{info, warn};

use crate::cipher::Cipher;
use crate::error::WebhookError;
use crate::event;
use crate::webhook::{self, Verdict, WebhookRequest};

pub const SIGNATURE_HEADER: &str = "x-lark-signature";
pub const TIMESTAMP_HEADER: &str = "x-lark-request-timestamp";
pub const NONCE_HEADER: &str = "x-lark-request-nonce";

#[derive(Clone)]
pub struct FeishuState {
    cipher: Option<Arc<Cipher>>,
    sink: Arc<dyn EventSink>,
    stats: Arc<StatsRegistry>,
}

impl FeishuState {
    pub fn new(
        config: &FeishuConfig,
        sink: Arc<dyn EventSink>,
        stats: Arc<StatsRegistry>,
    ) -> Result<Self, WebhookError> {
        let cipher = match config.encrypt_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Some(Arc::new(Cipher::new(key)?)),
            None => None,
        };
        Ok(Self {
            cipher,
            sink,
            stats,
        })
    }
}

/// Router serving `POST {config.path}`.
pub fn router(config: &FeishuConfig, state: FeishuState) -> Router {
    info!(path = %config.path, encrypted = state.cipher.is_some(), "feishu webhook route enabled");
    Router::new()
        .route(&config.path, post(webhook_handler))
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn reject(e: &WebhookError) -> Response {
    let status = match e {
        WebhookError::SignatureMismatch => StatusCode::FORBIDDEN,
        WebhookError::InvalidJson(_) | WebhookError::Decrypt(_) => StatusCode::BAD_REQUEST,
        WebhookError::InvalidKey => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %e, code = e.code(), "feishu webhook rejected");
    (status, Json(json!({ "error": e.to_string(), "code": e.code() }))).into_response()
}

async fn webhook_handler(
    State(state): State<FeishuState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // A signature that is not valid UTF-8 still counts as present; the
    // replacement characters never verify.
    let signature = headers
        .get(SIGNATURE_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
    let request = WebhookRequest {
        signature: signature.as_deref(),
        timestamp: header(&headers, TIMESTAMP_HEADER).unwrap_or_default(),
        nonce: header(&headers, NONCE_HEADER).unwrap_or_default(),
        body: &body,
    };

    let body = match webhook::process(state.cipher.as_deref(), &request) {
        Ok(Verdict::Challenge(challenge)) => {
            info!("answering feishu url verification");
            return Json(json!({ "challenge": challenge })).into_response();
        }
        Ok(Verdict::Event(body)) => body,
        Err(e) => return reject(&e),
    };

    if let Some(event) = event::dispatch(body) {
        if !event.self_id.is_empty() {
            state
                .stats
                .register(event::PLATFORM, &event.self_id)
                .received
                .add(1);
        }
        state.sink.dispatch(event).await;
    }

    Json(json!({})).into_response()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderValue, Request};
    use relay_core::InboundEvent;
    use serde_json::Value;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::*;
    use crate::cipher::tests::encrypt;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<InboundEvent>>);

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn dispatch(&self, event: InboundEvent) {
            self.0.lock().await.push(event);
        }
    }

    fn app(encrypt_key: Option<&str>) -> (Router, Arc<CollectingSink>, Arc<StatsRegistry>) {
        let config = FeishuConfig {
            encrypt_key: encrypt_key.map(String::from),
            ..Default::default()
        };
        let sink = Arc::new(CollectingSink::default());
        let stats = Arc::new(StatsRegistry::new());
        let state = FeishuState::new(&config, sink.clone(), Arc::clone(&stats)).unwrap();
        (router(&config, state), sink, stats)
    }

    fn post(body: impl Into<Body>, signature: Option<&str>) -> Request<Body> {
        post_raw(body, signature.map(|s| HeaderValue::from_str(s).unwrap()))
    }

    fn post_raw(body: impl Into<Body>, signature: Option<HeaderValue>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/feishu")
            .header("content-type", "application/json")
            .header(TIMESTAMP_HEADER, "1700000000")
            .header(NONCE_HEADER, "n1");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(body.into()).unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn challenge_round_trip() {
        let (app, sink, _) = app(None);
        let body = r#"{"type":"url_verification","challenge":"abc123"}"#;
        let response = app.oneshot(post(body, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({ "challenge": "abc123" }));
        assert!(sink.0.lock().await.is_empty());
    }

    #[tokio::test]
    async fn bad_signature_is_forbidden() {
        let (app, sink, _) = app(Some("secret"));
        let body = r#"{"type":"url_verification","challenge":"abc123"}"#;
        let response = app.oneshot(post(body, Some("00ff"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(sink.0.lock().await.is_empty());
    }

    #[tokio::test]
    async fn signed_encrypted_message_reaches_the_sink() {
        let (app, sink, stats) = app(Some("secret"));
        let inner = json!({
            "schema": "2.0",
            "header": { "event_type": "im.message.receive_v1", "app_id": "cli_1" },
            "event": {
                "sender": { "sender_id": { "open_id": "ou_a" }, "sender_type": "user" },
                "message": {
                    "message_id": "om_1",
                    "chat_id": "oc_1",
                    "chat_type": "p2p",
                    "message_type": "text",
                    "content": "{\"text\":\"ping\"}"
                }
            }
        })
        .to_string();
        let body = json!({ "encrypt": encrypt("secret", [9u8; 16], &inner) }).to_string();
        let signature = Cipher::new("secret")
            .unwrap()
            .signature("1700000000", "n1", body.as_bytes());

        let response = app.oneshot(post(body, Some(&signature))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({}));
        let events = sink.0.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subtype, relay_core::Subtype::Private);
        assert_eq!(stats.snapshot()[0].message_received, 1);
    }

    #[tokio::test]
    async fn non_utf8_signature_is_forbidden() {
        let (app, sink, _) = app(Some("secret"));
        let body = r#"{"type":"url_verification","challenge":"abc123"}"#;
        let signature = HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap();
        let response = app.oneshot(post_raw(body, Some(signature))).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(sink.0.lock().await.is_empty());
    }

    #[tokio::test]
    async fn event_without_app_id_is_delivered_but_not_counted() {
        let (app, sink, stats) = app(None);
        let body = json!({
            "header": { "event_type": "im.message.receive_v1" },
            "event": {
                "sender": { "sender_id": { "open_id": "ou_a" }, "sender_type": "user" },
                "message": {
                    "message_id": "om_2",
                    "chat_id": "oc_1",
                    "chat_type": "group",
                    "message_type": "text",
                    "content": "{\"text\":\"hi\"}"
                }
            }
        })
        .to_string();

        let response = app.oneshot(post(body, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(sink.0.lock().await.len(), 1);
        assert!(stats.snapshot().is_empty());
    }

    #[tokio::test]
    async fn misshapen_event_is_acknowledged() {
        let (app, sink, _) = app(None);
        let body = json!({ "header": { "event_id": "e9" }, "event": {} }).to_string();
        let response = app.oneshot(post(body, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(sink.0.lock().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (app, _, _) = app(None);
        let response = app.oneshot(post("not json", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
