//! Envelope-encrypted offsite storage for Bareos backup volumes
//!
//! Bareos writes file-backup volumes to a scratch directory on local disk;
//! this crate encrypts them and moves them into an S3-compatible object
//! store, and brings them back when a restore job needs them. Every volume is
//! protected with per-file envelope encryption, so only the passphrase has to
//! survive between backup and restore, and archival storage tiers (Glacier
//! and friends) are handled by requesting a thaw and telling the operator
//! when to retry.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Settings file loading and property resolution
//! - `error`: Custom error types
//! - `crypto`: Key management and the encrypted volume file format
//! - `naming`: Mapping between volume filenames and object keys
//! - `progress`: Rate-limited console progress reporting
//! - `store`: The object store boundary and the directory-backed backend
//! - `job`: The backup and restore orchestrators

pub mod config;
pub mod crypto;
pub mod error;
mod fsutil;
pub mod job;
pub mod naming;
pub mod progress;
pub mod store;

pub use error::{StorageError, StorageResult};
