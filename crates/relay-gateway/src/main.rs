use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use relay_channels::ChannelManager;
use relay_core::config::RelayConfig;
use relay_core::sink::ChannelSink;
use relay_core::stats::StatsRegistry;
use relay_core::{EventSink, InboundEvent};
use relay_discord::{DiscordAdapter, DiscordBot};
use relay_feishu::FeishuState;
use tokio::sync::mpsc;
use tracing::{info, warn};

mod app;
mod http;

/// Bridge between chat platforms: Discord REST outbound, Feishu webhooks inbound.
#[derive(Debug, Parser)]
#[command(name = "relay-gateway", version)]
struct Args {
    /// Config file; falls back to $RELAY_CONFIG, then ~/.relay/relay.toml.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relay_gateway=info,relay_discord=info,relay_feishu=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();
    let config_path = args.config.or_else(|| std::env::var("RELAY_CONFIG").ok());
    let config = RelayConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        RelayConfig::default()
    });

    let stats = Arc::new(StatsRegistry::new());

    // Inbound events: adapters -> sink -> dispatcher task.
    let (event_tx, event_rx) = mpsc::channel::<InboundEvent>(256);
    let sink: Arc<dyn EventSink> = Arc::new(ChannelSink::new(event_tx));
    tokio::spawn(log_events(event_rx));

    let mut channels = ChannelManager::new();
    let discord = match config.discord.as_ref() {
        Some(discord_cfg) => match DiscordBot::new(discord_cfg, Arc::clone(&stats)) {
            Ok(bot) => {
                let bot = Arc::new(bot);
                channels.register(Box::new(DiscordAdapter::new(
                    Arc::clone(&bot),
                    Arc::clone(&sink),
                )));
                Some(bot)
            }
            Err(e) => {
                warn!(error = %e, "discord adapter disabled");
                None
            }
        },
        None => None,
    };

    let feishu = match config.feishu.as_ref() {
        Some(feishu_cfg) => {
            let state = FeishuState::new(feishu_cfg, Arc::clone(&sink), Arc::clone(&stats))?;
            Some(relay_feishu::router(feishu_cfg, state))
        }
        None => None,
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(
        config,
        ChannelManager::new(),
        stats,
        discord,
        sink,
    ));
    let router = app::build_router(Arc::clone(&state), feishu);

    info!("Relay gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Adapters connect with backoff while the routes are already served.
    let connector = app::spawn_connect(Arc::clone(&state), channels);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    connector.abort();
    state.channels.write().await.disconnect_all().await;
    Ok(())
}

/// Stand-in for the command dispatcher: logs every inbound event.
async fn log_events(mut rx: mpsc::Receiver<InboundEvent>) {
    while let Some(event) = rx.recv().await {
        info!(
            platform = %event.platform,
            kind = event.kind.as_str(),
            message_id = %event.message_id,
            channel_id = ?event.channel_id,
            user_id = ?event.user_id(),
            "inbound event"
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
