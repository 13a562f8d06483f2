use std::sync::Arc;

use async_trait::async_trait;
use relay_channels::{Channel, ChannelError, ChannelStatus, OutboundMessage, SendReceipt};
use relay_core::EventSink;
use tracing::{info, warn};

use crate::api::GatewayPayload;
use crate::bot::DiscordBot;
use crate::error::DiscordError;
use crate::normalize;

/// Discord channel adapter.
///
/// Outbound messages go through the bot's transcoder; inbound dispatch
/// frames are normalized and handed to the event sink.
pub struct DiscordAdapter {
    bot: Arc<DiscordBot>,
    sink: Arc<dyn EventSink>,
    status: ChannelStatus,
}

impl DiscordAdapter {
    pub fn new(bot: Arc<DiscordBot>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            bot,
            sink,
            status: ChannelStatus::Disconnected,
        }
    }

    pub fn bot(&self) -> &Arc<DiscordBot> {
        &self.bot
    }

    pub async fn handle_payload(&self, payload: &GatewayPayload) -> Result<bool, DiscordError> {
        dispatch_payload(&self.bot, self.sink.as_ref(), payload).await
    }
}

/// Normalize one dispatch frame and deliver the result. Returns whether an
/// event reached the sink.
///
/// The bot identifies itself first if it has not yet, and nothing is
/// normalized until it has.
pub async fn dispatch_payload(
    bot: &DiscordBot,
    sink: &dyn EventSink,
    payload: &GatewayPayload,
) -> Result<bool, DiscordError> {
    if bot.self_id().is_empty() {
        if let Err(e) = bot.get_self().await {
            warn!(event = ?payload.t, error = %e, "dispatch refused: bot identity unknown");
            return Err(DiscordError::Unidentified(e.to_string()));
        }
    }

    let event = match normalize::normalize(bot.http(), bot.self_id(), payload).await {
        Ok(Some(event)) => event,
        Ok(None) => return Ok(false),
        Err(e) => {
            warn!(event = ?payload.t, error = %e, "failed to normalize discord dispatch");
            return Err(e);
        }
    };

    if let Some(counters) = bot.counters() {
        counters.received.add(1);
    }
    sink.dispatch(event).await;
    Ok(true)
}

#[async_trait]
impl Channel for DiscordAdapter {
    fn name(&self) -> &str {
        normalize::PLATFORM
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        self.status = ChannelStatus::Connecting;
        match self.bot.get_self().await {
            Ok(user) => {
                info!(bot_id = %user.id, "discord adapter ready");
                self.status = ChannelStatus::Connected;
                Ok(())
            }
            Err(e) => {
                self.status = ChannelStatus::Error(e.to_string());
                Err(ChannelError::ConnectionFailed(e.to_string()))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        self.status = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<SendReceipt, ChannelError> {
        self.bot
            .send_message(&msg.recipient_id, &msg.message)
            .await
            .map_err(ChannelError::from)
    }

    fn status(&self) -> ChannelStatus {
        self.status.clone()
    }
}
