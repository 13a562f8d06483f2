//! Event-type dispatch for verified Feishu webhook bodies.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use relay_core::segment::QuotedMessage;
use relay_core::{
    Author, CanonicalMessage, EventKind, InboundEvent, MessageRef, Segment, SegmentChain, Subtype,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const PLATFORM: &str = "feishu";
pub const MESSAGE_RECEIVE: &str = "im.message.receive_v1";

#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub header: Option<EventHeader>,
    #[serde(default)]
    pub event: Value,
}

#[derive(Debug, Deserialize)]
pub struct EventHeader {
    #[serde(default)]
    pub event_id: String,
    pub event_type: String,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub tenant_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserIds {
    #[serde(default)]
    pub open_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub union_id: Option<String>,
}

impl UserIds {
    fn preferred(&self) -> Option<&str> {
        self.open_id
            .as_deref()
            .or(self.user_id.as_deref())
            .or(self.union_id.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub sender_id: UserIds,
    /// `user` or `app`.
    #[serde(default)]
    pub sender_type: String,
}

#[derive(Debug, Deserialize)]
pub struct Mention {
    /// Placeholder in the text, e.g. `@_user_1`.
    pub key: String,
    #[serde(default)]
    pub id: UserIds,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceivedMessage {
    pub message_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
    pub chat_id: String,
    /// `p2p` or `group`.
    #[serde(default)]
    pub chat_type: String,
    #[serde(default)]
    pub message_type: String,
    /// JSON-encoded body; `{"text": ...}` for text messages.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

#[derive(Debug, Deserialize)]
pub struct MessageReceive {
    pub sender: Sender,
    pub message: ReceivedMessage,
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"@_user_\d+|@_all").expect("placeholder pattern is valid"))
}

/// Rewrite mention placeholders into segments. Unknown keys stay as text.
pub fn parse_text(text: &str, mentions: &[Mention]) -> SegmentChain {
    let mut chain = SegmentChain::new();
    let mut cursor = 0;

    for found in placeholder().find_iter(text) {
        let key = found.as_str();
        let segment = if key == "@_all" {
            Some(Segment::MentionAll)
        } else {
            mentions
                .iter()
                .find(|m| m.key == key)
                .and_then(|m| m.id.preferred())
                .map(Segment::mention_user)
        };

        if let Some(segment) = segment {
            chain.push_text(&text[cursor..found.start()]);
            chain.push(segment);
        } else {
            chain.push_text(&text[cursor..found.end()]);
        }
        cursor = found.end();
    }

    chain.push_text(&text[cursor..]);
    chain
}

fn millis(raw: Option<&str>) -> i64 {
    raw.and_then(|t| t.parse().ok())
        .unwrap_or_else(|| Utc::now().timestamp_millis())
}

fn normalize_receive(header: &EventHeader, event: MessageReceive) -> Option<InboundEvent> {
    let MessageReceive { sender, message } = event;

    if sender.sender_type == "app" {
        debug!(message_id = %message.message_id, "dropping app message");
        return None;
    }
    if message.message_type != "text" {
        debug!(message_id = %message.message_id, kind = %message.message_type, "unsupported message type");
        return None;
    }

    let text = serde_json::from_str::<Value>(&message.content)
        .ok()
        .and_then(|v| v.get("text").and_then(Value::as_str).map(String::from))
        .unwrap_or_default();
    let chain = parse_text(&text, &message.mentions);
    if chain.is_blank() {
        debug!(message_id = %message.message_id, "dropping empty message");
        return None;
    }

    let mut canonical = CanonicalMessage::new(chain);
    canonical.quote = message
        .parent_id
        .as_ref()
        .filter(|id| !id.is_empty())
        .map(|parent| {
            Box::new(QuotedMessage {
                reference: MessageRef {
                    channel_id: message.chat_id.clone(),
                    message_id: parent.clone(),
                },
                author: None,
                chain: SegmentChain::new(),
            })
        });

    let author = sender.sender_id.preferred().map(|id| Author {
        user_id: id.to_string(),
        ..Default::default()
    });

    Some(InboundEvent {
        platform: PLATFORM.to_string(),
        self_id: header.app_id.clone().unwrap_or_default(),
        kind: EventKind::Message,
        subtype: if message.chat_type == "p2p" {
            Subtype::Private
        } else {
            Subtype::Group
        },
        message_id: message.message_id,
        channel_id: Some(message.chat_id),
        guild_id: None,
        author,
        message: Some(canonical),
        timestamp: millis(message.create_time.as_deref().or(header.create_time.as_deref())),
    })
}

/// Route a verified body by `header.event_type`. Unknown types, bodies
/// without a header and bodies that do not fit the event shape are
/// acknowledged and yield nothing.
pub fn dispatch(body: Value) -> Option<InboundEvent> {
    let envelope: Envelope = match serde_json::from_value(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, "webhook body is not an event envelope");
            return None;
        }
    };
    let Some(header) = envelope.header else {
        debug!(schema = ?envelope.schema, "webhook body without event header");
        return None;
    };

    match header.event_type.as_str() {
        MESSAGE_RECEIVE => match serde_json::from_value::<MessageReceive>(envelope.event) {
            Ok(event) => normalize_receive(&header, event),
            Err(e) => {
                debug!(event_id = %header.event_id, error = %e, "malformed message event");
                None
            }
        },
        other => {
            debug!(event_type = %other, event_id = %header.event_id, "ignoring event type");
            None
        }
    }
}
