//! Webhook security gate.
//!
//! Two optional gates run in order: the signature check (only when a secret
//! is configured and the request is signed) and decryption of an `encrypt`
//! envelope. A URL-verification challenge short-circuits before dispatch.

use serde_json::Value;
use tracing::debug;

use crate::cipher::Cipher;
use crate::error::WebhookError;

/// The parts of an inbound request the gate looks at.
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub signature: Option<&'a str>,
    pub timestamp: &'a str,
    pub nonce: &'a str,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Echo this value back as `{challenge}`.
    Challenge(String),
    /// A verified, decrypted event body ready for dispatch.
    Event(Value),
}

pub fn process(cipher: Option<&Cipher>, request: &WebhookRequest<'_>) -> Result<Verdict, WebhookError> {
    // An unsigned request skips the check; a signed one must match.
    if let (Some(cipher), Some(signature)) = (cipher, request.signature) {
        if !signature.is_empty()
            && !cipher.verify(request.timestamp, request.nonce, request.body, signature)
        {
            return Err(WebhookError::SignatureMismatch);
        }
    }

    let mut body: Value = serde_json::from_slice(request.body)?;

    if let Some(cipher) = cipher {
        if let Some(encrypted) = body.get("encrypt").and_then(Value::as_str) {
            let plain = cipher.decrypt(encrypted)?;
            body = serde_json::from_str(&plain)?;
            debug!("decrypted webhook payload");
        }
    }

    if body.get("type").and_then(Value::as_str) == Some("url_verification") {
        if let Some(challenge) = body.get("challenge").and_then(Value::as_str) {
            return Ok(Verdict::Challenge(challenge.to_string()));
        }
    }

    Ok(Verdict::Event(body))
}
