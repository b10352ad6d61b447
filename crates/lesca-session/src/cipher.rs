//! Optional at-rest encryption for session files (spec.md §6).
//!
//! The on-disk format must be self-tagging so `load` can tell whether a
//! given file is ciphertext without attempting (and failing) a JSON
//! parse first. We tag with a fixed magic prefix (`LESCAENC1`) the way a
//! self-describing envelope format would — this is the detail spec.md
//! explicitly leaves "opaque ... but must be detectable on read".

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, AeadCore, Key, Nonce};
use thiserror::Error;

const MAGIC: &[u8] = b"LESCAENC1";

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption key not configured")]
    MissingKey,
    #[error("ciphertext rejected by AEAD (wrong key or corrupted)")]
    Reject,
    #[error("key must decode to 32 bytes, got {0}")]
    BadKeyLength(usize),
}

/// Pluggable at-rest cipher for session payloads.
pub trait SessionCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, CipherError>;
    /// Self-tagging predicate: does `bytes` look like this cipher's
    /// ciphertext envelope? Used by the store to decide whether to
    /// decrypt before attempting a plain JSON parse.
    fn is_encrypted(&self, bytes: &[u8]) -> bool;
}

/// Default cipher: passthrough, used when no `LESCA_ENCRYPTION_KEY` is
/// configured.
#[derive(Debug, Default)]
pub struct NoopCipher;

impl SessionCipher for NoopCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(bytes.to_vec())
    }

    fn is_encrypted(&self, _bytes: &[u8]) -> bool {
        false
    }
}

/// AES-256-GCM cipher keyed from the `LESCA_ENCRYPTION_KEY` environment
/// variable (spec.md §6 "Key source is an environment variable").
/// Envelope layout: `MAGIC || nonce (12 bytes) || ciphertext+tag`.
pub struct Aes256GcmCipher {
    cipher: Aes256Gcm,
}

impl Aes256GcmCipher {
    pub const ENV_VAR: &'static str = "LESCA_ENCRYPTION_KEY";

    /// Build from a raw 32-byte key.
    pub fn from_key_bytes(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != 32 {
            return Err(CipherError::BadKeyLength(key.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Build from the `LESCA_ENCRYPTION_KEY` env var, interpreting it as
    /// raw UTF-8 bytes padded/truncated is *not* done here: the key must
    /// already be exactly 32 bytes once decoded, matching AES-256's key
    /// size.
    pub fn from_env() -> Result<Self, CipherError> {
        let raw = std::env::var(Self::ENV_VAR).map_err(|_| CipherError::MissingKey)?;
        let key_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, raw.trim())
            .unwrap_or_else(|_| raw.into_bytes());
        Self::from_key_bytes(&key_bytes)
    }
}

impl SessionCipher for Aes256GcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::Reject)?;
        let mut out = Vec::with_capacity(MAGIC.len() + nonce.len() + ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, CipherError> {
        if !self.is_encrypted(bytes) {
            return Err(CipherError::Reject);
        }
        let rest = &bytes[MAGIC.len()..];
        if rest.len() < 12 {
            return Err(CipherError::Reject);
        }
        let (nonce_bytes, ciphertext) = rest.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CipherError::Reject)
    }

    fn is_encrypted(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(MAGIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let cipher = Aes256GcmCipher::from_key_bytes(&[7u8; 32]).unwrap();
        let ciphertext = cipher.encrypt(b"hello session").unwrap();
        assert!(cipher.is_encrypted(&ciphertext));
        let plaintext = cipher.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"hello session");
    }

    #[test]
    fn noop_cipher_never_tags_as_encrypted() {
        let cipher = NoopCipher;
        let out = cipher.encrypt(b"plain json").unwrap();
        assert!(!cipher.is_encrypted(&out));
        assert_eq!(out, b"plain json");
    }

    #[test]
    fn wrong_key_rejects() {
        let a = Aes256GcmCipher::from_key_bytes(&[1u8; 32]).unwrap();
        let b = Aes256GcmCipher::from_key_bytes(&[2u8; 32]).unwrap();
        let ciphertext = a.encrypt(b"secret").unwrap();
        assert!(b.decrypt(&ciphertext).is_err());
    }
}
