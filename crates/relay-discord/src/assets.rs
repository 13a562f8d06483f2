//! Asset resolution: decide whether an image or video goes out as a URL or
//! as uploaded bytes, and load those bytes.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use relay_core::{Asset, AssetMode};
use tracing::debug;

use crate::error::DiscordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
        }
    }

    /// Accept header sent with probes and downloads.
    pub fn accept(&self) -> String {
        format!("{}/*", self.as_str())
    }
}

/// Bytes ready for a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: &'static str,
}

impl Upload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let (ext, mime) = sniff(&bytes);
        Self {
            bytes,
            file_name: format!("file.{ext}"),
            mime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAsset {
    /// Post the URL as message content and let the platform unfurl it.
    Direct(String),
    Upload(Upload),
}

/// Remote access needed to resolve `http(s)` assets.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Content type reported for `url`, if the server sends one.
    async fn probe(&self, url: &str, accept: &str) -> Result<Option<String>, DiscordError>;

    async fn download(&self, url: &str, accept: &str) -> Result<Vec<u8>, DiscordError>;
}

/// Resolve one asset. `configured` applies when the segment has no override.
pub async fn resolve(
    fetcher: &dyn AssetFetcher,
    kind: AssetKind,
    asset: &Asset,
    configured: AssetMode,
) -> Result<ResolvedAsset, DiscordError> {
    let url = asset.url.as_str();
    if url.is_empty() {
        return Err(DiscordError::Validation(
            "invalid segment: url expected".to_string(),
        ));
    }

    if let Some(path) = url.strip_prefix("file://") {
        let bytes = tokio::fs::read(path).await?;
        return Ok(ResolvedAsset::Upload(Upload::from_bytes(bytes)));
    }

    if let Some(encoded) = url.strip_prefix("base64://") {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| DiscordError::Validation(format!("invalid base64 asset: {e}")))?;
        return Ok(ResolvedAsset::Upload(Upload::from_bytes(bytes)));
    }

    let accept = kind.accept();
    match asset.mode.unwrap_or(configured) {
        AssetMode::Direct => Ok(ResolvedAsset::Direct(url.to_string())),
        AssetMode::Download => download(fetcher, url, &accept).await,
        AssetMode::Auto => match fetcher.probe(url, &accept).await {
            Ok(Some(content_type)) if content_type.contains(kind.as_str()) => {
                Ok(ResolvedAsset::Direct(url.to_string()))
            }
            Ok(content_type) => {
                debug!(url, ?content_type, kind = kind.as_str(), "content type mismatch, uploading");
                download(fetcher, url, &accept).await
            }
            Err(e) => {
                debug!(url, error = %e, "asset probe failed, uploading");
                download(fetcher, url, &accept).await
            }
        },
    }
}

async fn download(
    fetcher: &dyn AssetFetcher,
    url: &str,
    accept: &str,
) -> Result<ResolvedAsset, DiscordError> {
    let bytes = fetcher.download(url, accept).await?;
    Ok(ResolvedAsset::Upload(Upload::from_bytes(bytes)))
}

/// File extension and MIME type guessed from magic bytes.
pub fn sniff(bytes: &[u8]) -> (&'static str, &'static str) {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => ("png", "image/png"),
        [0xFF, 0xD8, 0xFF, ..] => ("jpg", "image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => ("gif", "image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => ("webp", "image/webp"),
        [b'B', b'M', ..] => ("bmp", "image/bmp"),
        [_, _, _, _, b'f', b't', b'y', b'p', b'q', b't', ..] => ("mov", "video/quicktime"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => ("mp4", "video/mp4"),
        [0x1A, 0x45, 0xDF, 0xA3, ..] => ("webm", "video/webm"),
        [b'O', b'g', b'g', b'S', ..] => ("ogg", "video/ogg"),
        _ => ("bin", "application/octet-stream"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    struct FakeFetcher {
        content_type: Result<Option<&'static str>, ()>,
        probes: AtomicUsize,
        downloads: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(content_type: Result<Option<&'static str>, ()>) -> Self {
            Self {
                content_type,
                probes: AtomicUsize::new(0),
                downloads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AssetFetcher for FakeFetcher {
        async fn probe(&self, url: &str, accept: &str) -> Result<Option<String>, DiscordError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            assert!(accept.ends_with("/*"));
            self.content_type
                .map(|ct| ct.map(String::from))
                .map_err(|_| DiscordError::Transport {
                    url: url.to_string(),
                    payload: String::new(),
                    self_id: String::new(),
                    reason: "HTTP 405".to_string(),
                })
        }

        async fn download(&self, _url: &str, _accept: &str) -> Result<Vec<u8>, DiscordError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(PNG.to_vec())
        }
    }

    #[tokio::test]
    async fn auto_forwards_matching_content_type() {
        let fetcher = FakeFetcher::new(Ok(Some("image/png")));
        let asset = Asset::new("https://cdn/a.png");
        let resolved = resolve(&fetcher, AssetKind::Image, &asset, AssetMode::Auto)
            .await
            .unwrap();
        assert_eq!(resolved, ResolvedAsset::Direct("https://cdn/a.png".into()));
        assert_eq!(fetcher.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auto_uploads_on_mismatch_or_probe_failure() {
        for content_type in [Ok(Some("text/html")), Ok(None), Err(())] {
            let fetcher = FakeFetcher::new(content_type);
            let asset = Asset::new("https://site/page");
            let resolved = resolve(&fetcher, AssetKind::Image, &asset, AssetMode::Auto)
                .await
                .unwrap();
            match resolved {
                ResolvedAsset::Upload(upload) => {
                    assert_eq!(upload.file_name, "file.png");
                    assert_eq!(upload.mime, "image/png");
                }
                other => panic!("expected upload, got {other:?}"),
            }
            assert_eq!(fetcher.probes.load(Ordering::SeqCst), 1);
            assert_eq!(fetcher.downloads.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn direct_never_touches_the_network() {
        let fetcher = FakeFetcher::new(Ok(None));
        let asset = Asset::new("https://cdn/v.mp4");
        let resolved = resolve(&fetcher, AssetKind::Video, &asset, AssetMode::Direct)
            .await
            .unwrap();
        assert_eq!(resolved, ResolvedAsset::Direct("https://cdn/v.mp4".into()));
        assert_eq!(fetcher.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn segment_override_beats_configured_mode() {
        let fetcher = FakeFetcher::new(Ok(Some("image/png")));
        let asset = Asset::new("https://cdn/a.png").with_mode(AssetMode::Download);
        let resolved = resolve(&fetcher, AssetKind::Image, &asset, AssetMode::Direct)
            .await
            .unwrap();
        assert!(matches!(resolved, ResolvedAsset::Upload(_)));
        assert_eq!(fetcher.probes.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn local_and_inline_sources_are_uploaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"GIF89a....").unwrap();
        let fetcher = FakeFetcher::new(Ok(None));

        let url = format!("file://{}", file.path().display());
        let resolved = resolve(&fetcher, AssetKind::Image, &Asset::new(url), AssetMode::Direct)
            .await
            .unwrap();
        assert!(matches!(resolved, ResolvedAsset::Upload(ref u) if u.mime == "image/gif"));

        let inline = format!("base64://{}", BASE64.encode(PNG));
        let resolved = resolve(&fetcher, AssetKind::Image, &Asset::new(inline), AssetMode::Direct)
            .await
            .unwrap();
        assert!(matches!(resolved, ResolvedAsset::Upload(ref u) if u.bytes == PNG));
        assert_eq!(fetcher.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_inputs_are_validation_errors() {
        let fetcher = FakeFetcher::new(Ok(None));
        let empty = resolve(&fetcher, AssetKind::Image, &Asset::default(), AssetMode::Auto).await;
        assert!(matches!(empty, Err(DiscordError::Validation(_))));

        let garbage = Asset::new("base64://not base64!!");
        let bad = resolve(&fetcher, AssetKind::Image, &garbage, AssetMode::Auto).await;
        assert!(matches!(bad, Err(DiscordError::Validation(_))));
    }

    #[test]
    fn sniff_known_signatures() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]).0, "jpg");
        assert_eq!(sniff(b"\0\0\0\x18ftypmp42").1, "video/mp4");
        assert_eq!(sniff(b"\0\0\0\x14ftypqt  ").0, "mov");
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBPVP8 ").0, "webp");
        assert_eq!(sniff(b"plain"), ("bin", "application/octet-stream"));
    }
}
