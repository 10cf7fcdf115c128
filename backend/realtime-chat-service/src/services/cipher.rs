//! At-rest encryption of text message bodies.
//!
//! One AES-256-GCM key is derived at startup from `MESSAGE_ENCRYPTION_SECRET`
//! with HKDF-SHA256 and a fixed salt. Every encryption draws a fresh random
//! nonce. Ciphertext, nonce and tag are stored hex-encoded.

use crate::metrics::DECRYPTION_FAILURES_TOTAL;
use crate::models::StoredBody;
use crypto_core::{decrypt_at_rest, derive_key, encrypt_at_rest, generate_nonce, KEY_LEN, TAG_LEN};
use thiserror::Error;

/// Shown in place of a body that fails authentication
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "[Message could not be decrypted]";

const KEY_SALT: &[u8] = b"nova-realtime-chat/message-at-rest/v1";
const KEY_INFO: &[u8] = b"message-body";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed")]
    Decryption,
    #[error("invalid key material")]
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub nonce: String,
    pub auth_tag: String,
}

#[derive(Clone)]
pub struct MessageCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCipher").finish_non_exhaustive()
    }
}

impl MessageCipher {
    pub fn from_secret(secret: &str) -> Result<Self, CipherError> {
        let key = derive_key(secret.as_bytes(), KEY_SALT, KEY_INFO).map_err(|_| CipherError::Key)?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedPayload, CipherError> {
        let nonce = generate_nonce();
        let mut sealed = encrypt_at_rest(plaintext.as_bytes(), &self.key, &nonce)
            .map_err(|_| CipherError::Encryption)?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedPayload {
            ciphertext: hex::encode(sealed),
            nonce: hex::encode(nonce),
            auth_tag: hex::encode(tag),
        })
    }

    pub fn decrypt(&self, ciphertext: &str, nonce: &str, auth_tag: &str) -> Result<String, CipherError> {
        let mut sealed = hex::decode(ciphertext).map_err(|_| CipherError::Decryption)?;
        let nonce = hex::decode(nonce).map_err(|_| CipherError::Decryption)?;
        let tag = hex::decode(auth_tag).map_err(|_| CipherError::Decryption)?;
        if tag.len() != TAG_LEN {
            return Err(CipherError::Decryption);
        }
        sealed.extend_from_slice(&tag);

        let plaintext =
            decrypt_at_rest(&sealed, &self.key, &nonce).map_err(|_| CipherError::Decryption)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Decryption)
    }

    /// Encrypt a text body for storage
    pub fn seal(&self, plaintext: &str) -> Result<StoredBody, CipherError> {
        let payload = self.encrypt(plaintext)?;
        Ok(StoredBody {
            content: payload.ciphertext,
            nonce: Some(payload.nonce),
            auth_tag: Some(payload.auth_tag),
        })
    }

    /// Readable text for a stored text body. Never fails: undecryptable or
    /// corrupt bodies come back as [`UNDECRYPTABLE_PLACEHOLDER`].
    pub fn open(&self, body: &StoredBody) -> String {
        match (&body.nonce, &body.auth_tag) {
            (Some(nonce), Some(tag)) => match self.decrypt(&body.content, nonce, tag) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "stored message body failed authentication");
                    DECRYPTION_FAILURES_TOTAL.with_label_values(&["auth"]).inc();
                    UNDECRYPTABLE_PLACEHOLDER.to_string()
                }
            },
            (None, None) => body.content.clone(),
            _ => {
                tracing::warn!("stored message body has incomplete encryption fields");
                DECRYPTION_FAILURES_TOTAL.with_label_values(&["corrupt"]).inc();
                UNDECRYPTABLE_PLACEHOLDER.to_string()
            }
        }
    }
}
