//! Authenticated encryption of [`AttemptState`].
//!
//! Wire format: `base64url_nopad(nonce || ciphertext || tag)` where the
//! plaintext is the JSON form of the state. The purpose string is bound as
//! associated data, so a blob protected for one authentication type does not
//! decode under another.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cas_auth_sdk::{AttemptState, CodecError, StateDataFormat};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Derive a 256-bit key from an arbitrary-length secret.
fn derive_key(secret: &[u8]) -> [u8; 32] {
    Sha256::digest(secret).into()
}

/// AES-256-GCM [`StateDataFormat`].
pub struct AesGcmStateFormat {
    cipher: Aes256Gcm,
    purpose: String,
}

impl AesGcmStateFormat {
    /// Key the format from a configured secret.
    #[must_use]
    pub fn new(secret: &SecretString, purpose: impl Into<String>) -> Self {
        Self::from_key(&derive_key(secret.expose_secret().as_bytes()), purpose)
    }

    /// Key the format from fresh random bytes, valid for this process only.
    #[must_use]
    pub fn ephemeral(purpose: impl Into<String>) -> Self {
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        Self::from_key(&derive_key(&secret), purpose)
    }

    fn from_key(key: &[u8; 32], purpose: impl Into<String>) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            purpose: purpose.into(),
        }
    }
}

impl StateDataFormat for AesGcmStateFormat {
    fn protect(&self, state: &AttemptState) -> Result<String, CodecError> {
        let plaintext =
            serde_json::to_vec(state).map_err(|e| CodecError::Serialization(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: self.purpose.as_bytes(),
                },
            )
            .map_err(|e| CodecError::Serialization(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(&blob))
    }

    fn unprotect(&self, protected: &str) -> Result<AttemptState, CodecError> {
        let blob = URL_SAFE_NO_PAD
            .decode(protected)
            .map_err(|_| CodecError::Malformed)?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::Malformed);
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: self.purpose.as_bytes(),
                },
            )
            .map_err(|_| CodecError::Integrity)?;

        serde_json::from_slice(&plaintext).map_err(|_| CodecError::Malformed)
    }
}
