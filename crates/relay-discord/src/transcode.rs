//! Outbound transcoder. Turns a canonical message into ordered wire calls.
//!
//! Inline segments (text, mentions, channel refs, complete custom emoji) are
//! buffered as markup. Any other segment flushes the buffer as its own call
//! and then gets a dedicated call: an upload or URL for images and videos,
//! an embed for link cards. Calls are issued strictly in chain order.

use async_trait::async_trait;
use relay_channels::SendReceipt;
use relay_core::{Asset, AssetMode, CanonicalMessage, LinkCard, Segment};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::assets::{self, AssetFetcher, AssetKind, ResolvedAsset, Upload};
use crate::error::DiscordError;

/// Webhooks reject messages with more embeds than this.
pub const MAX_WEBHOOK_EMBEDS: usize = 10;

/// Where a message is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Channel { channel_id: String },
    Webhook { id: String, token: String, wait: bool },
}

impl Destination {
    pub fn channel(channel_id: impl Into<String>) -> Self {
        Destination::Channel {
            channel_id: channel_id.into(),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Destination::Channel { channel_id } => format!("/channels/{channel_id}/messages"),
            Destination::Webhook { id, token, wait } => {
                format!("/webhooks/{id}/{token}?wait={wait}")
            }
        }
    }

    pub fn is_webhook(&self) -> bool {
        matches!(self, Destination::Webhook { .. })
    }
}

/// One outbound HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub enum WireCall {
    Json {
        path: String,
        body: Value,
    },
    Multipart {
        path: String,
        upload: Upload,
        payload_json: Value,
    },
}

impl WireCall {
    pub fn path(&self) -> &str {
        match self {
            WireCall::Json { path, .. } | WireCall::Multipart { path, .. } => path,
        }
    }
}

/// Issues wire calls. Implemented by [`DiscordHttp`](crate::http::DiscordHttp).
#[async_trait]
pub trait WireTransport: Send + Sync {
    /// POST the call; returns the created message id when the response has one.
    async fn post(&self, call: &WireCall) -> Result<Option<String>, DiscordError>;
}

/// A wire call before asset resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<'a> {
    Content(String),
    Asset { kind: AssetKind, asset: &'a Asset },
    Card(&'a LinkCard),
}

/// Markup for a segment that can live inside running text.
pub fn render_inline(segment: &Segment) -> Option<String> {
    match segment {
        Segment::Text { content } => Some(content.clone()),
        Segment::MentionUser { id } => Some(format!("<@{id}>")),
        Segment::MentionAll => Some("@everyone".to_string()),
        Segment::MentionHere => Some("@here".to_string()),
        Segment::ChannelRef { id } => Some(format!("<#{id}>")),
        Segment::Emoji {
            id: Some(id),
            name: Some(name),
            animated,
        } if !id.is_empty() && !name.is_empty() => {
            let prefix = if *animated { "a" } else { "" };
            Some(format!("<{prefix}:{name}:{id}>"))
        }
        _ => None,
    }
}

/// Group a chain into ordered steps. The chain must already be stripped of
/// its leading quote.
pub fn plan(segments: &[Segment]) -> Vec<Step<'_>> {
    let mut steps = Vec::new();
    let mut buffer = String::new();

    for segment in segments {
        if let Some(markup) = render_inline(segment) {
            buffer.push_str(&markup);
            continue;
        }

        flush(&mut buffer, &mut steps);
        match segment {
            Segment::Image(asset) => steps.push(Step::Asset {
                kind: AssetKind::Image,
                asset,
            }),
            Segment::Video(asset) => steps.push(Step::Asset {
                kind: AssetKind::Video,
                asset,
            }),
            Segment::LinkCard(card) => steps.push(Step::Card(card)),
            _ => {}
        }
    }

    flush(&mut buffer, &mut steps);
    steps
}

fn flush(buffer: &mut String, steps: &mut Vec<Step<'_>>) {
    let content = buffer.trim();
    if !content.is_empty() {
        steps.push(Step::Content(content.to_string()));
    }
    buffer.clear();
}

/// Split off the reply reference: a leading quote segment, else the
/// message's resolved quote, else a `message_reference` passed in `addition`.
pub fn split_reply(message: &CanonicalMessage) -> (Option<Value>, &[Segment]) {
    let segments = message.chain.segments();
    if let Some((Segment::Quote { id, channel_id }, rest)) = segments.split_first() {
        let mut reference = json!({ "message_id": id });
        if let Some(channel_id) = channel_id {
            reference["channel_id"] = json!(channel_id);
        }
        return (Some(reference), rest);
    }
    if let Some(quote) = &message.quote {
        let reference = json!({
            "message_id": quote.reference.message_id,
            "channel_id": quote.reference.channel_id,
        });
        return (Some(reference), segments);
    }
    (message.addition.get("message_reference").cloned(), segments)
}

/// Checks that must pass before the first wire call.
pub fn validate(segments: &[Segment], destination: &Destination) -> Result<(), DiscordError> {
    for segment in segments {
        if let Segment::Image(asset) | Segment::Video(asset) = segment {
            if asset.url.is_empty() {
                return Err(DiscordError::Validation(
                    "invalid segment: url expected".to_string(),
                ));
            }
        }
    }

    if destination.is_webhook() {
        let embeds = segments
            .iter()
            .filter(|s| {
                matches!(
                    s,
                    Segment::Image(_) | Segment::Video(_) | Segment::LinkCard(_)
                )
            })
            .count();
        if embeds > MAX_WEBHOOK_EMBEDS {
            return Err(DiscordError::Validation(format!(
                "up to {MAX_WEBHOOK_EMBEDS} embed objects per webhook message, got {embeds}"
            )));
        }
    }
    Ok(())
}

pub fn content_body(content: &str, mut fields: Map<String, Value>) -> Value {
    fields.insert("content".to_string(), json!(content));
    Value::Object(fields)
}

/// Webhooks take an `embeds` array; channel endpoints take a single `embed`.
pub fn card_body(card: &LinkCard, mut fields: Map<String, Value>, webhook: bool) -> Value {
    let mut embed = Map::new();
    if let Some(title) = &card.title {
        embed.insert("title".to_string(), json!(title));
    }
    if let Some(description) = &card.description {
        embed.insert("description".to_string(), json!(description));
    }
    if let Some(url) = &card.url {
        embed.insert("url".to_string(), json!(url));
    }

    if webhook {
        fields.insert("embeds".to_string(), json!([embed]));
    } else {
        fields.insert("embed".to_string(), Value::Object(embed));
    }
    Value::Object(fields)
}

/// Drives one canonical message through planning, asset resolution and the transport.
pub struct Transcoder<'a> {
    pub transport: &'a dyn WireTransport,
    pub fetcher: &'a dyn AssetFetcher,
    /// Adapter-level asset mode, used when a segment has no override.
    pub asset_mode: AssetMode,
}

impl Transcoder<'_> {
    /// Send `message` to `destination`.
    ///
    /// A failing call aborts the rest of the chain; calls already made stay sent.
    pub async fn send(
        &self,
        destination: &Destination,
        message: &CanonicalMessage,
    ) -> Result<SendReceipt, DiscordError> {
        let (mut reply, segments) = split_reply(message);
        validate(segments, destination)?;

        let mut base = message.addition.clone();
        base.remove("content");
        base.remove("message_reference");

        let path = destination.path();
        let mut receipt = SendReceipt::default();

        for step in plan(segments) {
            let mut fields = base.clone();
            if let Some(reference) = reply.take() {
                fields.insert("message_reference".to_string(), reference);
            }

            let call = match step {
                Step::Content(content) => WireCall::Json {
                    path: path.clone(),
                    body: content_body(&content, fields),
                },
                Step::Asset { kind, asset } => {
                    match assets::resolve(self.fetcher, kind, asset, self.asset_mode).await? {
                        ResolvedAsset::Direct(url) => WireCall::Json {
                            path: path.clone(),
                            body: content_body(&url, fields),
                        },
                        ResolvedAsset::Upload(upload) => WireCall::Multipart {
                            path: path.clone(),
                            upload,
                            payload_json: Value::Object(fields),
                        },
                    }
                }
                Step::Card(card) => WireCall::Json {
                    path: path.clone(),
                    body: card_body(card, fields, destination.is_webhook()),
                },
            };

            let id = self.transport.post(&call).await?;
            debug!(path = %path, message_id = ?id, "wire call sent");
            if let Some(id) = id {
                receipt.push(id);
            }
        }

        Ok(receipt)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use relay_core::segment::QuotedMessage;
    use relay_core::{MessageRef, SegmentChain};

    use super::*;

    /// Records every call and answers with sequential ids.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub calls: Mutex<Vec<WireCall>>,
        pub fail_at: Option<usize>,
    }

    impl RecordingTransport {
        pub fn calls(&self) -> Vec<WireCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WireTransport for RecordingTransport {
        async fn post(&self, call: &WireCall) -> Result<Option<String>, DiscordError> {
            let mut calls = self.calls.lock().unwrap();
            if self.fail_at == Some(calls.len()) {
                return Err(DiscordError::Transport {
                    url: call.path().to_string(),
                    payload: String::new(),
                    self_id: "bot".to_string(),
                    reason: "HTTP 500".to_string(),
                });
            }
            calls.push(call.clone());
            Ok(Some(format!("m{}", calls.len())))
        }
    }

    /// Fetcher that must never be touched.
    pub(crate) struct NoNetwork;

    #[async_trait]
    impl AssetFetcher for NoNetwork {
        async fn probe(&self, url: &str, _accept: &str) -> Result<Option<String>, DiscordError> {
            panic!("unexpected probe of {url}")
        }
        async fn download(&self, url: &str, _accept: &str) -> Result<Vec<u8>, DiscordError> {
            panic!("unexpected download of {url}")
        }
    }

    fn transcoder<'a>(transport: &'a RecordingTransport) -> Transcoder<'a> {
        Transcoder {
            transport,
            fetcher: &NoNetwork,
            asset_mode: AssetMode::Direct,
        }
    }

    fn body(call: &WireCall) -> &Value {
        match call {
            WireCall::Json { body, .. } => body,
            WireCall::Multipart { payload_json, .. } => payload_json,
        }
    }

    #[test]
    fn inline_only_chain_is_one_call_in_order() {
        let chain = vec![
            Segment::text("hi "),
            Segment::mention_user("42"),
            Segment::text(" see "),
            Segment::channel_ref("7"),
            Segment::text(" "),
            Segment::MentionHere,
            Segment::emoji("wave", "99", false),
            Segment::emoji("spin", "100", true),
        ];
        let steps = plan(&chain);
        assert_eq!(
            steps,
            vec![Step::Content(
                "hi <@42> see <#7> @here<:wave:99><a:spin:100>".to_string()
            )]
        );
    }

    #[test]
    fn asset_between_text_yields_three_steps() {
        let chain = vec![
            Segment::text("before"),
            Segment::image("https://cdn/a.png"),
            Segment::MentionAll,
        ];
        let steps = plan(&chain);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0], Step::Content("before".to_string()));
        assert!(matches!(steps[1], Step::Asset { kind: AssetKind::Image, .. }));
        assert_eq!(steps[2], Step::Content("@everyone".to_string()));
    }

    #[test]
    fn incomplete_emoji_flushes_without_a_call() {
        let chain = vec![
            Segment::text("a"),
            Segment::Emoji {
                id: None,
                name: Some("x".into()),
                animated: false,
            },
            Segment::text("b"),
        ];
        assert_eq!(
            plan(&chain),
            vec![Step::Content("a".into()), Step::Content("b".into())]
        );
    }

    #[test]
    fn whitespace_buffer_is_not_flushed() {
        let chain = vec![Segment::text("  "), Segment::video("https://v/1.mp4")];
        let steps = plan(&chain);
        assert_eq!(steps.len(), 1);
        assert!(matches!(steps[0], Step::Asset { kind: AssetKind::Video, .. }));
    }

    #[test]
    fn webhook_embed_ceiling_is_enforced() {
        let chain: Vec<Segment> = (0..11).map(|i| Segment::image(format!("https://x/{i}"))).collect();
        let hook = Destination::Webhook {
            id: "1".into(),
            token: "t".into(),
            wait: true,
        };
        assert!(matches!(
            validate(&chain, &hook),
            Err(DiscordError::Validation(_))
        ));
        assert!(validate(&chain, &Destination::channel("5")).is_ok());
        assert!(validate(&chain[..10], &hook).is_ok());
    }

    #[test]
    fn asset_without_url_is_rejected() {
        let chain = vec![Segment::Image(Asset::default())];
        let err = validate(&chain, &Destination::channel("5")).unwrap_err();
        assert!(err.to_string().contains("url expected"));
    }

    #[test]
    fn card_layout_depends_on_destination() {
        let card = LinkCard {
            url: Some("https://example.com".into()),
            title: Some("Example".into()),
            description: None,
        };
        let channel = card_body(&card, Map::new(), false);
        assert_eq!(channel["embed"]["title"], "Example");
        assert!(channel.get("embeds").is_none());

        let webhook = card_body(&card, Map::new(), true);
        assert_eq!(webhook["embeds"][0]["url"], "https://example.com");
        assert!(webhook.get("embed").is_none());
    }

    #[test]
    fn destination_paths() {
        assert_eq!(Destination::channel("9").path(), "/channels/9/messages");
        let hook = Destination::Webhook {
            id: "1".into(),
            token: "abc".into(),
            wait: false,
        };
        assert_eq!(hook.path(), "/webhooks/1/abc?wait=false");
    }

    #[tokio::test]
    async fn quote_becomes_reply_of_first_call_only() {
        let transport = RecordingTransport::default();
        let message = CanonicalMessage::new(vec![
            Segment::quote("555"),
            Segment::text("look"),
            Segment::image("https://cdn/a.png"),
            Segment::text("after"),
        ]);

        let receipt = transcoder(&transport)
            .send(&Destination::channel("9"), &message)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(body(&calls[0])["message_reference"]["message_id"], "555");
        assert_eq!(body(&calls[0])["content"], "look");
        assert!(body(&calls[1]).get("message_reference").is_none());
        assert_eq!(body(&calls[1])["content"], "https://cdn/a.png");
        assert!(body(&calls[2]).get("message_reference").is_none());
        for call in &calls {
            assert!(!body(call).to_string().contains("quote"));
        }
        assert_eq!(receipt.message_ids, vec!["m1", "m2", "m3"]);
        assert_eq!(receipt.last_message_id(), Some("m3"));
    }

    #[tokio::test]
    async fn resolved_quote_and_addition_ride_along() {
        let transport = RecordingTransport::default();
        let mut message = CanonicalMessage::text("hello");
        message.quote = Some(Box::new(QuotedMessage {
            reference: MessageRef {
                channel_id: "3".into(),
                message_id: "4".into(),
            },
            author: None,
            chain: SegmentChain::new(),
        }));
        message.addition.insert("tts".into(), json!(true));
        message.addition.insert("content".into(), json!("ignored"));

        transcoder(&transport)
            .send(&Destination::channel("9"), &message)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let body = body(&calls[0]);
        assert_eq!(body["content"], "hello");
        assert_eq!(body["tts"], true);
        assert_eq!(body["message_reference"]["channel_id"], "3");
        assert_eq!(calls[0].path(), "/channels/9/messages");
    }

    #[tokio::test]
    async fn failure_aborts_remaining_calls() {
        let transport = RecordingTransport {
            fail_at: Some(1),
            ..Default::default()
        };
        let message = CanonicalMessage::new(vec![
            Segment::text("one"),
            Segment::image("https://cdn/a.png"),
            Segment::text("three"),
        ]);

        let err = transcoder(&transport)
            .send(&Destination::channel("9"), &message)
            .await
            .unwrap_err();

        assert!(matches!(err, DiscordError::Transport { .. }));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn validation_happens_before_any_call() {
        let transport = RecordingTransport::default();
        let message = CanonicalMessage::new(vec![
            Segment::text("first"),
            Segment::Video(Asset::default()),
        ]);
        let err = transcoder(&transport)
            .send(&Destination::channel("9"), &message)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscordError::Validation(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn webhook_card_goes_out_as_embeds_array() {
        let transport = RecordingTransport::default();
        let mut message = CanonicalMessage::new(vec![Segment::LinkCard(LinkCard {
            url: Some("https://e".into()),
            title: Some("t".into()),
            description: Some("d".into()),
        })]);
        message.addition.insert("username".into(), json!("relay"));

        let hook = Destination::Webhook {
            id: "1".into(),
            token: "tok".into(),
            wait: true,
        };
        transcoder(&transport).send(&hook, &message).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].path(), "/webhooks/1/tok?wait=true");
        assert_eq!(body(&calls[0])["embeds"][0]["description"], "d");
        assert_eq!(body(&calls[0])["username"], "relay");
    }
}
