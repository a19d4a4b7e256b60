//! Envelope encryption for volume files
//!
//! Each file gets a fresh AES-128 session key and nonce; the session key is
//! wrapped with AES-KW under a PBKDF2-derived key-encryption key and stored in
//! the file header, so only the passphrase has to survive between backup and
//! restore.

pub mod envelope;
mod gcm;
pub mod keys;

pub use envelope::{decrypt_file, encrypt_file, FILE_VERSION, HEADER_SIZE, MAGIC};
pub use keys::{KeyManager, SessionKey};
