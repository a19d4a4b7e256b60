//! Custom error types for the storage jobs
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. The launcher maps these onto process exit
//! codes: argument errors, configuration errors, and job failures each carry a
//! distinct code so Bareos run scripts can react to them.

use thiserror::Error;

/// The main error type for all backup and restore operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Malformed command-line arguments; the launcher prints usage and quits
    #[error("{0}")]
    BadArgs(String),

    /// Missing or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A local volume or remote object that should exist does not
    #[error("{0}")]
    VolumeMissing(String),

    /// A job prefix listed zero objects in the remote store
    #[error("{0}")]
    JobNotFound(String),

    /// Requested objects are still thawing out of the archival tier
    #[error("{0}")]
    RestoreInProgress(String),

    /// AEAD tag mismatch or session-key unwrap failure
    #[error("{0}")]
    IntegrityCheckFailed(String),

    /// The file does not carry our magic bytes (or is too short to)
    #[error("{0}")]
    NotEncryptedVolume(String),

    /// The file carries a format version this build does not understand
    #[error("{file} uses unsupported file format version {version}")]
    UnsupportedVersion { file: String, version: u16 },

    /// Input exceeds what a single AES-GCM invocation can safely protect
    #[error("{0}")]
    VolumeTooLarge(String),

    /// Cipher-layer failures outside the integrity path
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Per-volume failures collected from a parallel job run
    #[error("{}", format_volume_failures(.0))]
    VolumeFailures(Vec<(String, StorageError)>),

    /// Failures surfaced by the object store collaborator
    #[error("Object store error: {0}")]
    Store(String),

    /// Local filesystem failures
    #[error("I/O error: {0}")]
    Io(String),
}

impl StorageError {
    /// Check if this is an argument error (usage problem, not a job failure)
    pub fn is_bad_args(&self) -> bool {
        matches!(self, Self::BadArgs(_))
    }

    /// Check if this is an integrity error (tampering or wrong passphrase)
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::IntegrityCheckFailed(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

fn format_volume_failures(failures: &[(String, StorageError)]) -> String {
    let mut out = format!("{} volume(s) failed:", failures.len());
    for (name, err) in failures {
        out.push_str(&format!("\n  [{}] {}", name, err));
    }
    out
}

/// Result type alias for backup and restore operations
pub type StorageResult<T> = Result<T, StorageError>;
