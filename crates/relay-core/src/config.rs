use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::segment::AssetMode;

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_DISCORD_ENDPOINT: &str = "https://discord.com/api/v8";
pub const DEFAULT_FEISHU_PATH: &str = "/feishu";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Top-level config (relay.toml + RELAY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub discord: Option<DiscordConfig>,
    pub feishu: Option<FeishuConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token required on `POST /send/{channel}` and `POST /discord/dispatch`.
    /// Unset means open.
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// REST API base, without trailing slash.
    #[serde(default = "default_discord_endpoint")]
    pub endpoint: String,
    /// Adapter-level asset mode; a segment's own `mode` takes priority.
    #[serde(default)]
    pub handle_external_assets: AssetMode,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeishuConfig {
    /// Route the webhook listens on.
    #[serde(default = "default_feishu_path")]
    pub path: String,
    /// Shared secret. Enables the signature and decryption gates when set.
    pub encrypt_key: Option<String>,
}

impl Default for FeishuConfig {
    fn default() -> Self {
        Self {
            path: default_feishu_path(),
            encrypt_key: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_discord_endpoint() -> String {
    DEFAULT_DISCORD_ENDPOINT.to_string()
}
fn default_feishu_path() -> String {
    DEFAULT_FEISHU_PATH.to_string()
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl RelayConfig {
    /// Load config from a TOML file with RELAY_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `RELAY_DISCORD__BOT_TOKEN`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: RelayConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("RELAY_").split("__"))
            .extract()
            .map_err(|e| crate::error::RelayError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.relay/relay.toml", home)
}
