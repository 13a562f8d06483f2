/// Errors produced by the Discord adapter.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    /// A wire call failed at the network or HTTP-status level. Never retried.
    #[error("error when requesting {url} as {self_id}: {reason}; payload: {payload}")]
    Transport {
        url: String,
        payload: String,
        self_id: String,
        reason: String,
    },

    /// Caller misuse detected before any network call.
    #[error("invalid message: {0}")]
    Validation(String),

    /// A response arrived but did not have the expected shape.
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no bot token configured")]
    NoToken,

    /// The bot's own id could not be established, so its own messages
    /// cannot be told apart from anyone else's.
    #[error("bot identity unknown: {0}")]
    Unidentified(String),
}

impl From<DiscordError> for relay_channels::ChannelError {
    fn from(e: DiscordError) -> Self {
        use relay_channels::ChannelError;
        match e {
            DiscordError::Validation(reason) => ChannelError::Validation(reason),
            DiscordError::NoToken => ChannelError::ConfigError("no bot token configured".into()),
            other => ChannelError::SendFailed(other.to_string()),
        }
    }
}
