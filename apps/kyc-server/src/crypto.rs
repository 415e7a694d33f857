// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Field-level encryption for sensitive scalars.
//!
//! Tax identifiers, registration numbers and document references are sealed
//! with AES-256-GCM before they touch the application record. Each call uses
//! a fresh random 16-byte IV; the output is the hex-encoded triple
//! `{cipher_text, iv, auth_tag}`.
//!
//! ## Security Note
//!
//! - Decryption verifies the tag and fails closed on any mismatch
//! - Cleartext is never logged; use [`mask_sensitive`] for audit metadata
//! - The fallback key exists for local development only and is refused in
//!   production by configuration loading

use std::fmt;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::error;

/// AES-256-GCM with a 128-bit nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// IV length in bytes.
pub const IV_LEN: usize = 16;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Symmetric key length in bytes.
pub const KEY_LEN: usize = 32;

const FALLBACK_KEY_LABEL: &[u8] = b"kyc-server/development-only/field-key";

/// Encrypted representation of one sensitive string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    pub cipher_text: String,
    pub iv: String,
    pub auth_tag: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption key is invalid: {0}")]
    InvalidKey(String),

    #[error("encryption key is not configured")]
    MissingKey,

    #[error("system randomness unavailable")]
    Randomness,

    #[error("encryption failed")]
    Encrypt,

    #[error("encrypted field is malformed: {0}")]
    Malformed(String),

    #[error("encrypted field failed integrity verification")]
    Integrity,
}

/// Where the field key came from.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    /// 32 raw bytes supplied by the deployment.
    Provided([u8; KEY_LEN]),
    /// Derived locally; never acceptable in production.
    DevelopmentFallback([u8; KEY_LEN]),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Provided(_) => f.write_str("Provided(..)"),
            KeySource::DevelopmentFallback(_) => f.write_str("DevelopmentFallback(..)"),
        }
    }
}

impl KeySource {
    /// Parse a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("not hex: {e}")))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(KeySource::Provided(key))
    }

    /// Derive the development fallback key from an optional seed.
    pub fn development_fallback(seed: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FALLBACK_KEY_LABEL);
        if let Some(seed) = seed {
            hasher.update(seed.as_bytes());
        }
        KeySource::DevelopmentFallback(hasher.finalize().into())
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, KeySource::DevelopmentFallback(_))
    }

    fn key_bytes(&self) -> &[u8; KEY_LEN] {
        match self {
            KeySource::Provided(key) | KeySource::DevelopmentFallback(key) => key,
        }
    }
}

/// AES-256-GCM codec for sensitive strings.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm16,
    rng: SystemRandom,
    fallback: bool,
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl FieldCipher {
    pub fn new(source: &KeySource) -> Self {
        if source.is_fallback() {
            error!(
                "field encryption is using the DEVELOPMENT FALLBACK KEY; \
                 set KYC_ENCRYPTION_KEY before handling real data"
            );
        }
        Self {
            cipher: Aes256Gcm16::new(source.key_bytes().into()),
            rng: SystemRandom::new(),
            fallback: source.is_fallback(),
        }
    }

    pub fn uses_fallback_key(&self) -> bool {
        self.fallback
    }

    /// Encrypt a string under a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedField, CryptoError> {
        let mut iv = [0u8; IV_LEN];
        self.rng.fill(&mut iv).map_err(|_| CryptoError::Randomness)?;

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| CryptoError::Encrypt)?;

        Ok(EncryptedField {
            cipher_text: hex::encode(&buffer),
            iv: hex::encode(iv),
            auth_tag: hex::encode(tag),
        })
    }

    /// Decrypt a field, verifying its authentication tag.
    pub fn decrypt(&self, field: &EncryptedField) -> Result<String, CryptoError> {
        let iv = decode_exact(&field.iv, IV_LEN, "iv")?;
        let tag = decode_exact(&field.auth_tag, TAG_LEN, "auth_tag")?;
        let mut buffer = hex::decode(&field.cipher_text)
            .map_err(|e| CryptoError::Malformed(format!("cipher_text: {e}")))?;

        self.cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| CryptoError::Integrity)?;

        String::from_utf8(buffer).map_err(|_| CryptoError::Integrity)
    }
}

fn decode_exact(value: &str, len: usize, name: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = hex::decode(value).map_err(|e| CryptoError::Malformed(format!("{name}: {e}")))?;
    if bytes.len() != len {
        return Err(CryptoError::Malformed(format!(
            "{name}: expected {len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Mask a sensitive value for logs and audit metadata.
///
/// Keeps the first two and last two characters; values of four characters
/// or fewer become `***`.
pub fn mask_sensitive(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let mut masked = String::with_capacity(value.len());
    masked.extend(&chars[..2]);
    masked.extend(std::iter::repeat('*').take(chars.len() - 4));
    masked.extend(&chars[chars.len() - 2..]);
    masked
}
