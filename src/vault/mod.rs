//! Credential vault: the access token, encrypted at rest.
//!
//! The raw token never touches the state file. It is sealed into an
//! [`Envelope`] (salt, nonce, ciphertext) under a key derived from the
//! installation id, and only ever decrypted in memory.
//!
//! Decryption failure is not an error condition for callers: a corrupted
//! envelope, or one sealed by a different installation, reads as "no token
//! configured".

mod crypto;
mod mask;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::persistence::{DocumentError, PersistedState, StateFile};

pub use crypto::{Envelope, IV_LEN, KDF_ITERATIONS, KeySource, SALT_LEN};
pub use mask::mask_secret;

/// Errors from sealing or storing a token.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The cipher rejected the operation (including authentication failure).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The envelope is structurally invalid.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// Reading or writing the state file failed.
    #[error("state file error: {0}")]
    Document(#[from] DocumentError),

    /// The blocking key-derivation task did not complete.
    #[error("key derivation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Stores and loads the token through the shared state file.
///
/// Both operations run PBKDF2 on the blocking pool, so they are async.
#[derive(Debug, Clone)]
pub struct Vault {
    keys: KeySource,
    state: Arc<StateFile>,
}

impl Vault {
    pub fn new(keys: KeySource, state: Arc<StateFile>) -> Self {
        Vault { keys, state }
    }

    /// Seals `secret` and replaces any stored envelope with it.
    ///
    /// Any legacy plaintext copy is removed in the same write.
    pub async fn store(&self, secret: &str) -> Result<Envelope, VaultError> {
        let keys = self.keys.clone();
        let secret = secret.to_string();
        let envelope = tokio::task::spawn_blocking(move || keys.seal(&secret)).await??;

        let stored = envelope.clone();
        self.state.update(move |doc| {
            doc.pat_encrypted = Some(stored);
            doc.pat = None;
        })?;
        debug!("stored new token envelope");
        Ok(envelope)
    }

    /// Returns the stored token, or `None` if there is none or it cannot
    /// be decrypted.
    pub async fn load(&self) -> Option<String> {
        let envelope = match self.state.load() {
            Ok(doc) => doc.pat_encrypted?,
            Err(e) => {
                warn!(error = %e, "could not read state file, treating token as absent");
                return None;
            }
        };

        let keys = self.keys.clone();
        match tokio::task::spawn_blocking(move || keys.open(&envelope)).await {
            Ok(Ok(secret)) => Some(secret),
            Ok(Err(e)) => {
                warn!(error = %e, "stored token could not be decrypted, treating as absent");
                None
            }
            Err(e) => {
                warn!(error = %e, "token decryption task failed");
                None
            }
        }
    }
}

/// Outcome of the plaintext-token upgrade step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaintextMigration {
    /// No plaintext token was present.
    NothingToDo,
    /// A plaintext token was sealed into a new envelope and removed.
    Encrypted,
    /// An envelope already existed; the stale plaintext copy was removed.
    DroppedStaleCopy,
    /// The plaintext token was blank; it was removed and nothing sealed.
    DroppedBlank,
}

/// Upgrades a document written by a version that stored the token in clear.
///
/// Guarded by presence of the plaintext key, so running it again is a no-op.
pub fn migrate_plaintext(
    doc: &mut PersistedState,
    keys: &KeySource,
) -> Result<PlaintextMigration, VaultError> {
    let Some(plain) = doc.pat.as_deref() else {
        return Ok(PlaintextMigration::NothingToDo);
    };

    if doc.pat_encrypted.is_some() {
        doc.pat = None;
        return Ok(PlaintextMigration::DroppedStaleCopy);
    }

    let plain = plain.trim();
    if plain.is_empty() {
        doc.pat = None;
        return Ok(PlaintextMigration::DroppedBlank);
    }
    doc.pat_encrypted = Some(keys.seal(plain)?);
    doc.pat = None;
    Ok(PlaintextMigration::Encrypted)
}
