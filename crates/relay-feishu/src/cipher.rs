//! Shared-secret operations for Feishu webhooks: request signatures and
//! payload decryption. Built once from the configured encrypt key and
//! shared read-only by every request.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;

pub struct Cipher {
    keyed: HmacSha256,
    key: [u8; 32],
}

impl Cipher {
    pub fn new(encrypt_key: &str) -> Result<Self, WebhookError> {
        let keyed = <HmacSha256 as Mac>::new_from_slice(encrypt_key.as_bytes())
            .map_err(|_| WebhookError::InvalidKey)?;
        Ok(Self {
            keyed,
            key: Sha256::digest(encrypt_key.as_bytes()).into(),
        })
    }

    fn mac(&self, timestamp: &str, nonce: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(timestamp.as_bytes());
        mac.update(nonce.as_bytes());
        mac.update(body);
        mac
    }

    /// Lowercase hex HMAC-SHA256 over `timestamp ‖ nonce ‖ body`.
    pub fn signature(&self, timestamp: &str, nonce: &str, body: &[u8]) -> String {
        hex::encode(self.mac(timestamp, nonce, body).finalize().into_bytes())
    }

    /// Constant-time comparison against a hex signature header.
    pub fn verify(&self, timestamp: &str, nonce: &str, body: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        self.mac(timestamp, nonce, body).verify_slice(&expected).is_ok()
    }

    /// Decrypt a base64 `encrypt` field: AES-256-CBC, IV in the first block,
    /// PKCS#7 padding.
    pub fn decrypt(&self, encrypted: &str) -> Result<String, WebhookError> {
        let raw = BASE64
            .decode(encrypted.trim())
            .map_err(|e| WebhookError::Decrypt(format!("invalid base64: {e}")))?;
        if raw.len() <= IV_LEN || (raw.len() - IV_LEN) % IV_LEN != 0 {
            return Err(WebhookError::Decrypt(format!(
                "ciphertext length {} is not a whole number of blocks",
                raw.len()
            )));
        }

        let (iv, data) = raw.split_at(IV_LEN);
        let plain = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|e| WebhookError::Decrypt(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|_| WebhookError::Decrypt("bad padding".to_string()))?;

        String::from_utf8(plain).map_err(|e| WebhookError::Decrypt(e.to_string()))
    }
}
