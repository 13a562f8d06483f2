//! Thin REST client for the Discord API.
//!
//! Every call is authenticated with `Authorization: Bot {token}`. Failures
//! carry the URL, the serialized payload and the bot's own id so a single
//! log line is enough to reproduce them. Nothing is retried.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::config::DiscordConfig;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{multipart, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::api::{GuildMember, Message};
use crate::assets::{AssetFetcher, Upload};
use crate::error::DiscordError;
use crate::normalize::MessageSource;
use crate::paginate::MemberPages;
use crate::transcode::{WireCall, WireTransport};

pub struct DiscordHttp {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    self_id: OnceLock<String>,
}

impl DiscordHttp {
    pub fn new(config: &DiscordConfig) -> Result<Self, DiscordError> {
        if config.bot_token.trim().is_empty() {
            return Err(DiscordError::NoToken);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| DiscordError::Transport {
                url: config.endpoint.clone(),
                payload: String::new(),
                self_id: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            self_id: OnceLock::new(),
        })
    }

    /// The bot's own user id, once [`set_self_id`](Self::set_self_id) has run.
    pub fn self_id(&self) -> Option<&str> {
        self.self_id.get().map(String::as_str)
    }

    pub fn set_self_id(&self, id: impl Into<String>) {
        // First writer wins; the id never changes for a token.
        let _ = self.self_id.set(id.into());
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Send a JSON request and return the raw response. Empty bodies become `Null`.
    pub async fn request_value(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, DiscordError> {
        let url = self.url(path);
        let payload = body.map(Value::to_string).unwrap_or_default();
        let mut builder = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        debug!(%method, %url, "discord request");
        self.execute(builder, &url, &payload).await
    }

    /// Send a request with a serializable body and decode the response.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, DiscordError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DiscordError::Validation(format!("unserializable body: {e}")))?;
        let value = self.request_value(method, path, body.as_ref()).await?;
        serde_json::from_value(value).map_err(|e| DiscordError::Decode {
            url: self.url(path),
            reason: e.to_string(),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, DiscordError> {
        self.request::<T, Value>(Method::GET, path, None).await
    }

    /// POST a message with one file attached; the JSON fields travel as `payload_json`.
    pub async fn request_multipart(
        &self,
        path: &str,
        upload: &Upload,
        payload_json: &Value,
    ) -> Result<Value, DiscordError> {
        let url = self.url(path);
        let payload = format!(
            "{payload_json} + {} ({} bytes)",
            upload.file_name,
            upload.bytes.len()
        );

        let file = multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(upload.mime)
            .map_err(|e| self.transport_error(&url, &payload, e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("payload_json", payload_json.to_string());

        debug!(%url, file = %upload.file_name, "discord multipart upload");
        let builder = self.client.post(&url).multipart(form);
        self.execute(builder, &url, &payload).await
    }

    async fn execute(
        &self,
        builder: RequestBuilder,
        url: &str,
        payload: &str,
    ) -> Result<Value, DiscordError> {
        let response = builder
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| self.transport_error(url, payload, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(url, payload, e.to_string()))?;

        if !status.is_success() {
            return Err(self.transport_error(url, payload, format!("HTTP {status}: {text}")));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| DiscordError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn transport_error(&self, url: &str, payload: &str, reason: String) -> DiscordError {
        DiscordError::Transport {
            url: url.to_string(),
            payload: payload.to_string(),
            self_id: self.self_id().unwrap_or("unknown").to_string(),
            reason,
        }
    }

    /// Unauthenticated request to a third-party asset host.
    async fn fetch_asset(
        &self,
        method: Method,
        url: &str,
        accept: &str,
    ) -> Result<reqwest::Response, DiscordError> {
        let response = self
            .client
            .request(method, url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| self.transport_error(url, "", e.to_string()))?;
        if !response.status().is_success() {
            return Err(self.transport_error(url, "", format!("HTTP {}", response.status())));
        }
        Ok(response)
    }
}

#[async_trait]
impl WireTransport for DiscordHttp {
    async fn post(&self, call: &WireCall) -> Result<Option<String>, DiscordError> {
        let response = match call {
            WireCall::Json { path, body } => {
                self.request_value(Method::POST, path, Some(body)).await?
            }
            WireCall::Multipart {
                path,
                upload,
                payload_json,
            } => self.request_multipart(path, upload, payload_json).await?,
        };
        Ok(response
            .get("id")
            .and_then(Value::as_str)
            .map(String::from))
    }
}

#[async_trait]
impl AssetFetcher for DiscordHttp {
    async fn probe(&self, url: &str, accept: &str) -> Result<Option<String>, DiscordError> {
        let response = self.fetch_asset(Method::HEAD, url, accept).await?;
        Ok(response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from))
    }

    async fn download(&self, url: &str, accept: &str) -> Result<Vec<u8>, DiscordError> {
        let response = self.fetch_asset(Method::GET, url, accept).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(url, "", e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MessageSource for DiscordHttp {
    async fn fetch_message(&self, channel_id: &str, message_id: &str) -> Result<Message, DiscordError> {
        self.get(&format!("/channels/{channel_id}/messages/{message_id}"))
            .await
    }
}

#[async_trait]
impl MemberPages for DiscordHttp {
    async fn member_page(
        &self,
        guild_id: &str,
        limit: usize,
        after: &str,
    ) -> Result<Vec<GuildMember>, DiscordError> {
        self.get(&format!("/guilds/{guild_id}/members?limit={limit}&after={after}"))
            .await
    }
}
