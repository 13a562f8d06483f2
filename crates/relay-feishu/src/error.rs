/// Reasons a Feishu webhook request is refused.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Raised before the body is parsed.
    #[error("webhook signature mismatch")]
    SignatureMismatch,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("failed to decrypt payload: {0}")]
    Decrypt(String),

    #[error("encrypt key cannot be used as an HMAC key")]
    InvalidKey,
}

impl WebhookError {
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::SignatureMismatch => "SIGNATURE_MISMATCH",
            WebhookError::InvalidJson(_) => "INVALID_JSON",
            WebhookError::Decrypt(_) => "DECRYPT_FAILED",
            WebhookError::InvalidKey => "INVALID_KEY",
        }
    }
}
