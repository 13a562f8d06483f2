//! Canonical segment model: the platform-neutral shape of a rich message.
//!
//! A message is an ordered [`SegmentChain`]; order is significant and every
//! adapter must preserve it. Platform-only fields that have no segment form
//! travel in [`CanonicalMessage::addition`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Author;

/// How an outbound binary asset reaches the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetMode {
    /// Probe the URL's content type; forward it when it matches, else upload.
    #[default]
    Auto,
    /// Always fetch the bytes and upload them.
    Download,
    /// Forward the URL as plain content, never fetching it.
    Direct,
}

/// Image or video payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// `http(s)://`, `file://` or `base64://` source. Empty means missing.
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Per-segment override of the adapter's asset mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AssetMode>,
}

impl Asset {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    pub fn with_mode(mut self, mode: AssetMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Rich link preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One typed unit of message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text {
        content: String,
    },
    MentionUser {
        id: String,
    },
    MentionAll,
    MentionHere,
    ChannelRef {
        id: String,
    },
    Emoji {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        animated: bool,
    },
    Image(Asset),
    Video(Asset),
    LinkCard(LinkCard),
    /// Reply marker. Only meaningful as the first element of a chain.
    Quote {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<String>,
    },
}

impl Segment {
    pub fn text(content: impl Into<String>) -> Self {
        Segment::Text {
            content: content.into(),
        }
    }

    pub fn mention_user(id: impl Into<String>) -> Self {
        Segment::MentionUser { id: id.into() }
    }

    pub fn channel_ref(id: impl Into<String>) -> Self {
        Segment::ChannelRef { id: id.into() }
    }

    pub fn emoji(name: impl Into<String>, id: impl Into<String>, animated: bool) -> Self {
        Segment::Emoji {
            id: Some(id.into()),
            name: Some(name.into()),
            animated,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Segment::Image(Asset::new(url))
    }

    pub fn video(url: impl Into<String>) -> Self {
        Segment::Video(Asset::new(url))
    }

    pub fn quote(id: impl Into<String>) -> Self {
        Segment::Quote {
            id: id.into(),
            channel_id: None,
        }
    }
}

/// Ordered sequence of segments forming one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentChain(Vec<Segment>);

impl SegmentChain {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    /// Append text, merging into a trailing text segment. Empty text is ignored.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Segment::Text { content }) = self.0.last_mut() {
            content.push_str(text);
            return;
        }
        self.0.push(Segment::text(text));
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the chain carries nothing a user would see.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|s| match s {
            Segment::Text { content } => content.trim().is_empty(),
            _ => false,
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Segment> {
        self.0
    }
}

impl From<Vec<Segment>> for SegmentChain {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl FromIterator<Segment> for SegmentChain {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SegmentChain {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Weak reference to a message on its origin platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

/// A quoted message resolved from its origin. The identity comes from the
/// referencing message, not from the fetched body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedMessage {
    pub reference: MessageRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default)]
    pub chain: SegmentChain,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    #[serde(default)]
    pub chain: SegmentChain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<Box<QuotedMessage>>,
    /// Platform passthrough fields merged into every wire body.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub addition: Map<String, Value>,
}

impl CanonicalMessage {
    pub fn new(chain: impl Into<SegmentChain>) -> Self {
        Self {
            chain: chain.into(),
            ..Self::default()
        }
    }

    /// Message whose chain is a single text segment.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(vec![Segment::text(content)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_text_merges_adjacent_text() {
        let mut chain = SegmentChain::new();
        chain.push_text("hello ");
        chain.push_text("world");
        chain.push(Segment::MentionAll);
        chain.push_text("");
        chain.push_text("!");
        assert_eq!(
            chain.segments(),
            &[
                Segment::text("hello world"),
                Segment::MentionAll,
                Segment::text("!"),
            ]
        );
    }

    #[test]
    fn whitespace_only_chain_is_blank() {
        let chain = SegmentChain::from(vec![Segment::text("  \n")]);
        assert!(chain.is_blank());
        assert!(SegmentChain::new().is_blank());

        let chain = SegmentChain::from(vec![Segment::text(" "), Segment::MentionHere]);
        assert!(!chain.is_blank());
    }

    #[test]
    fn segments_use_snake_case_type_tags() {
        let json = r#"[
            {"type":"text","content":"hi"},
            {"type":"mention_user","id":"42"},
            {"type":"image","url":"https://x/a.png","mode":"direct"},
            {"type":"link_card","title":"T"},
            {"type":"mention_all"}
        ]"#;
        let chain: SegmentChain = serde_json::from_str(json).unwrap();
        assert_eq!(chain.len(), 5);
        assert_eq!(
            chain.segments()[2],
            Segment::Image(Asset::new("https://x/a.png").with_mode(AssetMode::Direct))
        );

        let out = serde_json::to_value(&chain).unwrap();
        assert_eq!(out[1]["type"], "mention_user");
        assert_eq!(out[3]["type"], "link_card");
    }

    #[test]
    fn image_without_url_deserializes_as_missing() {
        let seg: Segment = serde_json::from_str(r#"{"type":"image"}"#).unwrap();
        assert_eq!(seg, Segment::Image(Asset::default()));
    }
}
