use relay_core::CanonicalMessage;
use serde::{Deserialize, Serialize};

/// A message to be delivered to an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Platform-native identifier of the destination (channel id, chat id, …).
    pub recipient_id: String,

    /// Content to deliver.
    pub message: CanonicalMessage,
}

/// Ids of every wire call issued for one outbound message, in chain order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_ids: Vec<String>,
}

impl SendReceipt {
    pub fn push(&mut self, id: String) {
        self.message_ids.push(id);
    }

    /// Id of the final wire call, the single id older callers expect.
    pub fn last_message_id(&self) -> Option<&str> {
        self.message_ids.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.message_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_ids.is_empty()
    }
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Fully connected and ready to send/receive.
    Connected,

    /// Attempting to establish or re-establish the connection.
    Connecting,

    /// Cleanly disconnected (not an error condition).
    Disconnected,

    /// An unrecoverable (or pre-retry) error occurred.
    Error(String),
}
