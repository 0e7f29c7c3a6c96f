//! Credential encryption
//!
//! Node credentials (SSH passwords, private keys, kubeconfigs) are stored
//! only as ChaCha20-Poly1305 ciphertext under a single 256-bit process key.
//! A fresh random 96-bit nonce is drawn for every encryption.
//!
//! The key is supplied as 64 hex characters, either through the
//! `NODE_CONSOLE_ENCRYPTION_KEY` environment variable or the config file.
//! A missing or malformed key is a startup failure, never a runtime one.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Environment variable holding the hex-encoded key
pub const ENCRYPTION_KEY_ENV: &str = "NODE_CONSOLE_ENCRYPTION_KEY";

/// Expected key length in hex characters (32 bytes)
pub const KEY_HEX_LEN: usize = 64;

/// Nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// Decrypted credential; wiped from memory on drop
pub type Plaintext = Zeroizing<String>;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error(
        "NODE_CONSOLE_ENCRYPTION_KEY is not set. Generate one with \
         `openssl rand -hex 32` or `nodeconsole keygen`"
    )]
    MissingKey,

    #[error(
        "Encryption key must be 64 hex characters (256 bits), got {0}. Generate one with \
         `openssl rand -hex 32` or `nodeconsole keygen`"
    )]
    InvalidKeyLength(usize),

    #[error(
        "Encryption key is not valid hex. Generate one with \
         `openssl rand -hex 32` or `nodeconsole keygen`"
    )]
    InvalidKeyEncoding,

    #[error("Credential nonce must be 12 bytes, got {0}")]
    InvalidNonce(usize),

    #[error("Credential encryption failed")]
    Encryption,

    #[error("Credential decryption failed: data was tampered with or encrypted under another key")]
    Decryption,

    #[error("Decrypted credential is not valid UTF-8")]
    InvalidPlaintext,

    #[error("Invalid credential encoding: {0}")]
    Encoding(String),
}

/// Ciphertext and nonce of one stored credential
///
/// Serialized as base64 strings. `Debug` prints only the lengths.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCredential {
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,

    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
}

impl EncryptedCredential {
    /// Decode a credential from its base64 fields
    pub fn from_base64(ciphertext: &str, iv: &str) -> Result<Self, CipherError> {
        Ok(Self {
            ciphertext: base64_bytes::decode(ciphertext)?,
            iv: base64_bytes::decode(iv)?,
        })
    }

    /// Base64 of the ciphertext
    pub fn ciphertext_base64(&self) -> String {
        base64_bytes::encode(&self.ciphertext)
    }

    /// Base64 of the nonce
    pub fn iv_base64(&self) -> String {
        base64_bytes::encode(&self.iv)
    }
}

impl fmt::Debug for EncryptedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedCredential")
            .field("ciphertext", &format_args!("<{} bytes>", self.ciphertext.len()))
            .field("iv", &format_args!("<{} bytes>", self.iv.len()))
            .finish()
    }
}

/// Authenticated encryption of node credentials
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: ChaCha20Poly1305,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("algorithm", &Self::ALGORITHM)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl CredentialCipher {
    pub const ALGORITHM: &'static str = "ChaCha20-Poly1305";

    /// Build a cipher from a hex-encoded 256-bit key
    ///
    /// Fails fast when the key is absent, has the wrong length or is not
    /// hex. Surrounding whitespace is ignored.
    pub fn from_hex_key(key: Option<&str>) -> Result<Self, CipherError> {
        let key = key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(CipherError::MissingKey)?;

        if key.len() != KEY_HEX_LEN {
            return Err(CipherError::InvalidKeyLength(key.chars().count()));
        }

        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(key, bytes.as_mut_slice())
            .map_err(|_| CipherError::InvalidKeyEncoding)?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(bytes.as_slice())),
        })
    }

    /// Build a cipher from `NODE_CONSOLE_ENCRYPTION_KEY`
    pub fn from_env() -> Result<Self, CipherError> {
        let key = std::env::var(ENCRYPTION_KEY_ENV).ok().map(Zeroizing::new);
        Self::from_hex_key(key.as_deref().map(String::as_str))
    }

    /// Encrypt a credential under a fresh random nonce
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedCredential, CipherError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encryption)?;

        Ok(EncryptedCredential {
            ciphertext,
            iv: nonce.to_vec(),
        })
    }

    /// Decrypt and authenticate a stored credential
    pub fn decrypt(&self, credential: &EncryptedCredential) -> Result<Plaintext, CipherError> {
        if credential.iv.len() != NONCE_LEN {
            return Err(CipherError::InvalidNonce(credential.iv.len()));
        }

        let nonce = Nonce::from_slice(&credential.iv);
        let bytes = Zeroizing::new(
            self.cipher
                .decrypt(nonce, credential.ciphertext.as_slice())
                .map_err(|_| CipherError::Decryption)?,
        );

        let text = std::str::from_utf8(&bytes).map_err(|_| CipherError::InvalidPlaintext)?;
        Ok(Zeroizing::new(text.to_string()))
    }

    /// Generate a new random key as 64 hex characters
    pub fn generate_hex_key() -> String {
        let mut key = Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(key.as_mut_slice());
        hex::encode(key.as_slice())
    }
}

mod base64_bytes {
    use super::CipherError;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    pub fn decode(text: &str) -> Result<Vec<u8>, CipherError> {
        STANDARD
            .decode(text.trim())
            .map_err(|e| CipherError::Encoding(e.to_string()))
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).map_err(serde::de::Error::custom)
    }
}
