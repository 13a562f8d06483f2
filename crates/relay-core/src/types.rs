use serde::{Deserialize, Serialize};

use crate::segment::CanonicalMessage;

/// Profile of a message author as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Message,
    MessageUpdated,
    MessageDeleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::MessageUpdated => "message-updated",
            EventKind::MessageDeleted => "message-deleted",
        }
    }
}

/// Whether the event happened in a group (guild / chat group) or a DM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subtype {
    Group,
    Private,
}

/// A normalized platform event, ready for the external dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Logical platform name (e.g. "discord", "feishu").
    pub platform: String,
    /// Identity of the bot that received the event.
    pub self_id: String,
    pub kind: EventKind,
    pub subtype: Subtype,
    pub message_id: String,
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    pub author: Option<Author>,
    /// Absent for deletions.
    pub message: Option<CanonicalMessage>,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl InboundEvent {
    pub fn user_id(&self) -> Option<&str> {
        self.author.as_ref().map(|a| a.user_id.as_str())
    }
}
