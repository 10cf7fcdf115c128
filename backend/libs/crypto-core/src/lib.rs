//! Shared cryptographic primitives for Nova services
//!
//! - `jwt`: RS256 session token validation shared by REST and WebSocket auth
//! - at-rest AEAD helpers (AES-256-GCM) and HKDF key derivation

pub mod jwt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

/// AES-GCM nonce length in bytes (96 bits)
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length in bytes
pub const TAG_LEN: usize = 16;
/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption error")]
    Encryption,
    #[error("decryption error")]
    Decryption,
    #[error("invalid key material")]
    InvalidKey,
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Derive a 256-bit key from a secret with HKDF-SHA256.
pub fn derive_key(secret: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), secret);
    let mut key = [0u8; KEY_LEN];
    hk.expand(info, &mut key)
        .map_err(|_| CryptoError::InvalidKey)?;
    Ok(key)
}

/// Encrypt with AES-256-GCM. Output is `ciphertext || tag`.
pub fn encrypt_at_rest(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)
}

/// Decrypt `ciphertext || tag` produced by [`encrypt_at_rest`].
pub fn decrypt_at_rest(
    sealed: &[u8],
    key: &[u8; KEY_LEN],
    nonce: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_LEN || sealed.len() < TAG_LEN {
        return Err(CryptoError::Decryption);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Decryption)
}
