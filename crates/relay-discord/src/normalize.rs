//! Inbound normalizer: Discord message payloads into canonical events.

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use relay_core::segment::QuotedMessage;
use relay_core::{
    Asset, Author, CanonicalMessage, EventKind, InboundEvent, LinkCard, MessageRef, Segment,
    SegmentChain, Subtype,
};
use tracing::debug;

use crate::api::{Embed, GatewayPayload, Message, MessageDelete};
use crate::error::DiscordError;

pub const PLATFORM: &str = "discord";

/// Looks up the message a reply points at.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_message(&self, channel_id: &str, message_id: &str)
        -> Result<Message, DiscordError>;
}

fn markup() -> &'static Regex {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    MARKUP.get_or_init(|| {
        Regex::new(
            r"<@[!&]?(?P<user>\d+)>|<(?P<animated>a?):(?P<name>\w+):(?P<emoji>\d+)>|(?P<all>@everyone)|(?P<here>@here)|<#(?P<channel>\d+)>",
        )
        .expect("markup pattern is valid")
    })
}

/// Split message text into text runs and markup segments, in order.
pub fn parse_content(content: &str) -> SegmentChain {
    let mut chain = SegmentChain::new();
    let mut cursor = 0;

    for caps in markup().captures_iter(content) {
        let Some(whole) = caps.get(0) else { continue };
        chain.push_text(&content[cursor..whole.start()]);
        cursor = whole.end();

        let segment = if let Some(id) = caps.name("user") {
            Segment::mention_user(id.as_str())
        } else if let Some(id) = caps.name("emoji") {
            Segment::Emoji {
                id: Some(id.as_str().to_string()),
                name: caps.name("name").map(|m| m.as_str().to_string()),
                animated: caps.name("animated").is_some_and(|m| !m.as_str().is_empty()),
            }
        } else if caps.name("all").is_some() {
            Segment::MentionAll
        } else if caps.name("here").is_some() {
            Segment::MentionHere
        } else if let Some(id) = caps.name("channel") {
            Segment::channel_ref(id.as_str())
        } else {
            continue;
        };
        chain.push(segment);
    }

    chain.push_text(&content[cursor..]);
    chain
}

fn adapt_embed(embed: &Embed) -> Option<Segment> {
    match embed.kind.as_deref()? {
        "video" => {
            let mut asset = Asset::new(embed.url.clone()?);
            asset.proxy_url = embed.video.as_ref().and_then(|v| v.proxy_url.clone());
            Some(Segment::Video(asset))
        }
        "image" => {
            let thumbnail = embed.thumbnail.as_ref();
            let url = thumbnail
                .and_then(|t| t.url.clone())
                .or_else(|| embed.url.clone())?;
            let mut asset = Asset::new(url);
            asset.proxy_url = thumbnail.and_then(|t| t.proxy_url.clone());
            Some(Segment::Image(asset))
        }
        // gifv keeps only the video url, never the proxy.
        "gifv" => {
            let url = embed
                .video
                .as_ref()
                .and_then(|v| v.url.clone())
                .or_else(|| embed.url.clone())?;
            Some(Segment::Video(Asset::new(url)))
        }
        "link" | "rich" => Some(Segment::LinkCard(LinkCard {
            url: embed.url.clone(),
            title: embed.title.clone(),
            description: embed.description.clone(),
        })),
        other => {
            debug!(kind = other, "ignoring embed type");
            None
        }
    }
}

/// Canonical author and chain for a message. Attachments follow the text,
/// embeds follow the attachments.
pub fn adapt_message(message: &Message) -> (Option<Author>, SegmentChain) {
    let mut chain = parse_content(&message.content);

    for attachment in &message.attachments {
        let mut asset = Asset::new(attachment.url.clone());
        asset.proxy_url = attachment.proxy_url.clone();
        chain.push(Segment::Image(asset));
    }
    for segment in message.embeds.iter().filter_map(adapt_embed) {
        chain.push(segment);
    }

    let author = message.author.as_ref().map(|user| Author {
        user_id: user.id.clone(),
        username: Some(user.username.clone()),
        nickname: message
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .or_else(|| Some(user.username.clone())),
        avatar: user.avatar.clone(),
        discriminator: user.discriminator.clone(),
    });

    (author, chain)
}

fn timestamp_ms(raw: Option<&str>) -> i64 {
    raw.and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp_millis())
        .unwrap_or_else(|| Utc::now().timestamp_millis())
}

fn subtype(guild_id: Option<&String>) -> Subtype {
    if guild_id.is_some() {
        Subtype::Group
    } else {
        Subtype::Private
    }
}

/// Build the event for `message`, resolving its reply target if it has one.
pub async fn build_event(
    source: &dyn MessageSource,
    self_id: &str,
    message: &Message,
    kind: EventKind,
) -> Result<InboundEvent, DiscordError> {
    let (author, chain) = adapt_message(message);
    assemble(source, self_id, message, kind, author, chain).await
}

async fn assemble(
    source: &dyn MessageSource,
    self_id: &str,
    message: &Message,
    kind: EventKind,
    author: Option<Author>,
    chain: SegmentChain,
) -> Result<InboundEvent, DiscordError> {
    let reference = message
        .message_reference
        .as_ref()
        .and_then(|r| Some((r.message_id.clone()?, r.channel_id.clone())));

    let quote = match reference {
        Some((message_id, channel_id)) => {
            let channel_id = channel_id.unwrap_or_else(|| message.channel_id.clone());
            let quoted = source.fetch_message(&channel_id, &message_id).await?;
            let (quoted_author, quoted_chain) = adapt_message(&quoted);
            Some(Box::new(QuotedMessage {
                reference: MessageRef {
                    channel_id,
                    message_id,
                },
                author: quoted_author,
                chain: quoted_chain,
            }))
        }
        None => None,
    };

    let mut canonical = CanonicalMessage::new(chain);
    canonical.quote = quote;

    Ok(InboundEvent {
        platform: PLATFORM.to_string(),
        self_id: self_id.to_string(),
        kind,
        subtype: subtype(message.guild_id.as_ref()),
        message_id: message.id.clone(),
        channel_id: Some(message.channel_id.clone()),
        guild_id: message.guild_id.clone(),
        author,
        message: Some(canonical),
        timestamp: timestamp_ms(message.timestamp.as_deref()),
    })
}

/// Normalize a created or edited message. Returns `None` for messages with
/// nothing to say and for the bot's own messages.
pub async fn normalize_message(
    source: &dyn MessageSource,
    self_id: &str,
    message: &Message,
    kind: EventKind,
) -> Result<Option<InboundEvent>, DiscordError> {
    let (author, chain) = adapt_message(message);

    if chain.is_blank() {
        debug!(message_id = %message.id, "dropping empty message");
        return Ok(None);
    }
    if author.as_ref().is_some_and(|a| a.user_id == self_id) {
        debug!(message_id = %message.id, "dropping own message");
        return Ok(None);
    }

    assemble(source, self_id, message, kind, author, chain)
        .await
        .map(Some)
}

/// Normalize one gateway dispatch. Dispatches other than message
/// create/update/delete yield `None`.
pub async fn normalize(
    source: &dyn MessageSource,
    self_id: &str,
    payload: &GatewayPayload,
) -> Result<Option<InboundEvent>, DiscordError> {
    let kind = match payload.t.as_deref() {
        Some("MESSAGE_CREATE") => EventKind::Message,
        Some("MESSAGE_UPDATE") => EventKind::MessageUpdated,
        Some("MESSAGE_DELETE") => {
            let deleted: MessageDelete = decode(payload)?;
            return Ok(Some(InboundEvent {
                platform: PLATFORM.to_string(),
                self_id: self_id.to_string(),
                kind: EventKind::MessageDeleted,
                subtype: subtype(deleted.guild_id.as_ref()),
                message_id: deleted.id,
                channel_id: deleted.channel_id,
                guild_id: deleted.guild_id,
                author: None,
                message: None,
                timestamp: Utc::now().timestamp_millis(),
            }));
        }
        other => {
            debug!(event = ?other, "ignoring dispatch");
            return Ok(None);
        }
    };

    let message: Message = decode(payload)?;
    normalize_message(source, self_id, &message, kind).await
}

fn decode<T: serde::de::DeserializeOwned>(payload: &GatewayPayload) -> Result<T, DiscordError> {
    serde_json::from_value(payload.d.clone()).map_err(|e| DiscordError::Decode {
        url: format!("gateway:{}", payload.t.as_deref().unwrap_or("?")),
        reason: e.to_string(),
    })
}
