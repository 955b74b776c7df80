//! AES-256-GCM envelope encryption with a PBKDF2-derived key.
//!
//! The key is derived from the installation id (the extension origin the
//! browser launched us for) and a per-envelope random salt. Every seal uses
//! a fresh salt and a fresh nonce.

use std::fmt;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;

use super::VaultError;

/// PBKDF2 rounds used for every production key.
pub const KDF_ITERATIONS: u32 = 100_000;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// Encrypted-at-rest form of the access token.
///
/// The three blobs are always stored together; on disk they are base64
/// strings, matching what the extension itself wrote.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("salt_len", &self.salt.len())
            .field("iv_len", &self.iv.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Everything needed to derive envelope keys for one installation.
#[derive(Clone)]
pub struct KeySource {
    install_id: String,
    iterations: u32,
}

impl KeySource {
    pub fn new(install_id: impl Into<String>) -> Self {
        KeySource {
            install_id: install_id.into(),
            iterations: KDF_ITERATIONS,
        }
    }

    /// Cheap key derivation so property tests stay fast. Envelopes sealed
    /// with this source only open with the same iteration count.
    #[cfg(test)]
    pub(crate) fn for_tests(install_id: impl Into<String>) -> Self {
        KeySource {
            install_id: install_id.into(),
            iterations: 64,
        }
    }

    pub fn install_id(&self) -> &str {
        &self.install_id
    }

    pub fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            self.install_id.as_bytes(),
            salt,
            self.iterations,
            &mut key,
        );
        key
    }

    /// Encrypts `secret` under a fresh salt and nonce.
    pub fn seal(&self, secret: &str) -> Result<Envelope, VaultError> {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| VaultError::Crypto(format!("AES key init failed: {e}")))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), secret.as_bytes())
            .map_err(|e| VaultError::Crypto(format!("AES-GCM encrypt failed: {e}")))?;

        Ok(Envelope {
            salt: salt.to_vec(),
            iv: iv.to_vec(),
            ciphertext,
        })
    }

    /// Decrypts an envelope. Any tampering or key mismatch is an error.
    pub fn open(&self, envelope: &Envelope) -> Result<String, VaultError> {
        if envelope.iv.len() != IV_LEN {
            return Err(VaultError::Malformed(format!(
                "nonce must be {IV_LEN} bytes, got {}",
                envelope.iv.len()
            )));
        }

        let key = self.derive_key(&envelope.salt);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| VaultError::Crypto(format!("AES key init failed: {e}")))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&envelope.iv), envelope.ciphertext.as_ref())
            .map_err(|e| VaultError::Crypto(format!("AES-GCM decrypt failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|_| VaultError::Malformed("plaintext is not UTF-8".to_string()))
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySource")
            .field("install_id", &self.install_id)
            .field("iterations", &self.iterations)
            .finish()
    }
}

mod b64 {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
