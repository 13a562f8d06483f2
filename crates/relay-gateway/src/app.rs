use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use relay_channels::ChannelManager;
use relay_core::config::RelayConfig;
use relay_core::stats::StatsRegistry;
use relay_core::EventSink;
use relay_discord::DiscordBot;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: RelayConfig,
    /// Connected adapters. Writers only during startup and shutdown.
    pub channels: RwLock<ChannelManager>,
    pub stats: Arc<StatsRegistry>,
    /// Set when a Discord bot is configured; receives forwarded dispatch frames.
    pub discord: Option<Arc<DiscordBot>>,
    pub sink: Arc<dyn EventSink>,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        channels: ChannelManager,
        stats: Arc<StatsRegistry>,
        discord: Option<Arc<DiscordBot>>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            channels: RwLock::new(channels),
            stats,
            discord,
            sink,
        }
    }
}

/// Connect `channels` off the request path and install them in `state` once
/// each has connected or exhausted its retries. Routes keep serving in the
/// meantime; a channel is not reachable through `/send` until installed.
pub fn spawn_connect(state: Arc<AppState>, mut channels: ChannelManager) -> JoinHandle<()> {
    tokio::spawn(async move {
        channels.connect_all().await;
        let mut live = state.channels.write().await;
        live.absorb(channels);
        info!(channels = live.statuses().len(), "channel adapters installed");
    })
}

/// Assemble the full Axum router. `feishu` is the webhook route, already
/// bound to its own state.
pub fn build_router(state: Arc<AppState>, feishu: Option<Router>) -> Router {
    let mut router = Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/status", get(crate::http::status::status_handler))
        .route("/send/{channel}", post(crate::http::send::send_handler))
        .route(
            "/discord/dispatch",
            post(crate::http::dispatch::dispatch_handler),
        )
        .with_state(state);

    if let Some(feishu) = feishu {
        router = router.merge(feishu);
    }
    router.layer(tower_http::trace::TraceLayer::new_for_http())
}
