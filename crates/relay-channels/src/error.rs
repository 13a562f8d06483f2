use thiserror::Error;

/// Errors that can occur within any channel adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying transport could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A wire call failed at the network or HTTP-status level.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The message was rejected before any wire call was issued.
    #[error("Invalid message: {0}")]
    Validation(String),

    /// The channel rejected the supplied credentials or token.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The adapter does not support outbound delivery.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The channel-specific configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
