//! Key management: KEK derivation, session keys, and AES key wrapping
//!
//! Every file is encrypted under its own random session key; only that
//! session key, wrapped with AES-KW under the passphrase-derived KEK, is
//! stored in the file header. The KEK itself never leaves this process.

use std::sync::OnceLock;

use aes_kw::KekAes128;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{StorageError, StorageResult};

/// Size of an AES-128 key in bytes
pub const AES_KEY_SIZE: usize = 16;

/// AES-KW output length: wrapped key plus 64 bits of integrity checksum
pub const WRAPPED_KEY_SIZE: usize = AES_KEY_SIZE + 8;

/// Recommended AES-GCM nonce size, per NIST SP 800-38D p8, 5.2.1.1
pub const NONCE_SIZE: usize = 12;

/// PBKDF2 iteration count; deliberately slow to resist offline guessing
const PBKDF2_ITERATIONS: u32 = 50_000;

/// Fixed KDF salt. Changing it would orphan every existing archive.
const KEK_SALT: [u8; 32] = [
    0xe9, 0x81, 0x2e, 0x27, 0xee, 0x93, 0xf1, 0x6c, 0xdc, 0xdc, 0xf5, 0x7a, 0xba, 0xa4, 0x53,
    0x1e, 0xef, 0x40, 0x33, 0xc9, 0xbd, 0x71, 0x60, 0xc5, 0x5c, 0x5e, 0xdd, 0x42, 0x4d, 0x90,
    0xc0, 0xba,
];

/// A single-use AES-128 data-encryption key
///
/// Generated fresh for every file operation and never reused; zeroed on drop.
#[derive(Debug)]
pub struct SessionKey([u8; AES_KEY_SIZE]);

impl SessionKey {
    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; AES_KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Derives and caches the key-encryption key, and wraps session keys with it
///
/// KEK derivation runs at most once per process; `OnceLock` gives the
/// compute-once-then-read-only behavior the concurrent workers rely on.
pub struct KeyManager {
    passphrase: Zeroizing<String>,
    kek: OnceLock<[u8; AES_KEY_SIZE]>,
}

impl KeyManager {
    /// Create a key manager for the given passphrase
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
            kek: OnceLock::new(),
        }
    }

    /// Derive (once) and return the key-encryption key
    fn kek(&self) -> &[u8; AES_KEY_SIZE] {
        self.kek.get_or_init(|| {
            let mut kek = [0u8; AES_KEY_SIZE];
            pbkdf2_hmac::<Sha256>(
                self.passphrase.as_bytes(),
                &KEK_SALT,
                PBKDF2_ITERATIONS,
                &mut kek,
            );
            kek
        })
    }

    /// Generate a fresh random session key
    pub fn new_session_key(&self) -> SessionKey {
        let mut key = [0u8; AES_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        SessionKey(key)
    }

    /// Generate a fresh random nonce. Not secret, but never reuse one.
    pub fn new_nonce(&self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }

    /// Wrap a session key under the KEK for storage in a file header
    pub fn wrap(&self, session_key: &SessionKey) -> StorageResult<[u8; WRAPPED_KEY_SIZE]> {
        let kek = KekAes128::from(*self.kek());
        let mut wrapped = [0u8; WRAPPED_KEY_SIZE];
        kek.wrap(session_key.as_bytes(), &mut wrapped)
            .map_err(|e| StorageError::Crypto(format!("Failed to wrap session key: {}", e)))?;
        Ok(wrapped)
    }

    /// Unwrap a session key read back from a file header
    ///
    /// AES-KW carries its own integrity checksum, so a failure here almost
    /// always means the file was wrapped under a different KEK, i.e. the
    /// configured passphrase does not match.
    pub fn unwrap_key(&self, wrapped: &[u8; WRAPPED_KEY_SIZE]) -> StorageResult<SessionKey> {
        let kek = KekAes128::from(*self.kek());
        let mut key = [0u8; AES_KEY_SIZE];
        kek.unwrap(wrapped, &mut key).map_err(|_| {
            StorageError::IntegrityCheckFailed(
                "Failed to unwrap session key (check that the configured encryption passphrase \
                 matches what this file was encrypted with)"
                    .to_string(),
            )
        })?;
        Ok(SessionKey(key))
    }
}

impl Drop for KeyManager {
    fn drop(&mut self) {
        if let Some(mut kek) = self.kek.take() {
            kek.zeroize();
        }
    }
}
