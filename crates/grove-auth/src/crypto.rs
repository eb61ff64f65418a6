//! At-rest encryption for OAuth tokens.
//!
//! Tokens are sealed with AES-256-GCM under a fresh 16-byte IV and stored as
//! `hex(iv):hex(tag):hex(ciphertext)`.

use std::fmt;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use rand::RngCore;
use thiserror::Error;

type TokenAead = AesGcm<Aes256, U16>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption key must be 32 bytes of hex")]
    InvalidKey,

    #[error("malformed token envelope: {0}")]
    Malformed(&'static str),

    #[error("token failed authentication")]
    Authentication,

    #[error("decrypted token is not valid UTF-8")]
    Utf8,
}

#[derive(Clone)]
pub struct TokenCipher {
    aead: TokenAead,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKey);
        }
        let aead = TokenAead::new_from_slice(key).map_err(|_| CipherError::InvalidKey)?;
        Ok(Self { aead })
    }

    /// Build a cipher from the 64-character hex key kept in configuration.
    pub fn from_hex_key(key_hex: &str) -> Result<Self, CipherError> {
        let key = hex::decode(key_hex.trim()).map_err(|_| CipherError::InvalidKey)?;
        Self::new(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .aead
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| CipherError::Authentication)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CipherError> {
        let mut parts = envelope.split(':');
        let (Some(iv_hex), Some(tag_hex), Some(body_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::Malformed("expected iv:tag:ciphertext"));
        };

        let iv = hex::decode(iv_hex).map_err(|_| CipherError::Malformed("iv is not hex"))?;
        let tag = hex::decode(tag_hex).map_err(|_| CipherError::Malformed("tag is not hex"))?;
        let mut buffer =
            hex::decode(body_hex).map_err(|_| CipherError::Malformed("ciphertext is not hex"))?;

        if iv.len() != IV_LEN {
            return Err(CipherError::Malformed("iv length"));
        }
        if tag.len() != TAG_LEN {
            return Err(CipherError::Malformed("tag length"));
        }

        self.aead
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::<U16>::from_slice(&tag),
            )
            .map_err(|_| CipherError::Authentication)?;

        String::from_utf8(buffer).map_err(|_| CipherError::Utf8)
    }
}
