//! Hand-off point between the adapters and the external dispatcher.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::types::InboundEvent;

/// Receives normalized inbound events. The command framework behind it is
/// not part of this workspace.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn dispatch(&self, event: InboundEvent);
}

/// Sink that forwards events over a bounded Tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<InboundEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<InboundEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn dispatch(&self, event: InboundEvent) {
        let message_id = event.message_id.clone();
        if self.tx.send(event).await.is_err() {
            warn!(message_id = %message_id, "event sink closed, inbound event dropped");
        }
    }
}
