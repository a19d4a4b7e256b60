//! Object store boundary
//!
//! The jobs consume the remote store through the [`ObjectStore`] trait and
//! never talk to a concrete backend directly. The collaborator owns transfer
//! mechanics (multipart, retries); the core treats each call as blocking and
//! its eventual failure as final. [`DirectoryStore`] is the shipped backend:
//! a local directory that emulates storage classes, archival restores, and
//! paged listings.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod dir;

pub use dir::DirectoryStore;

/// Storage class of a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    Standard,
    StandardIa,
    #[serde(rename = "ONEZONE_IA")]
    OneZoneIa,
    Glacier,
    DeepArchive,
}

impl StorageClass {
    /// Archival classes need a thaw before their objects can be downloaded
    pub fn is_archival(self) -> bool {
        matches!(self, Self::Glacier | Self::DeepArchive)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standard => "STANDARD",
            Self::StandardIa => "STANDARD_IA",
            Self::OneZoneIa => "ONEZONE_IA",
            Self::Glacier => "GLACIER",
            Self::DeepArchive => "DEEP_ARCHIVE",
        };
        write!(f, "{}", name)
    }
}

/// Retrieval tier for archival restores; the tier decides how long the thaw
/// takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestoreTier {
    Expedited,
    #[default]
    Standard,
    Bulk,
}

impl RestoreTier {
    /// Human-readable estimate of how long a thaw at this tier takes
    pub fn expected_wait(self) -> &'static str {
        match self {
            Self::Expedited => "1-5 minutes",
            Self::Standard => "3-5 hours",
            Self::Bulk => "5-12 hours",
        }
    }
}

impl fmt::Display for RestoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Expedited => "expedited",
            Self::Standard => "standard",
            Self::Bulk => "bulk",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for RestoreTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "expedited" => Ok(Self::Expedited),
            "standard" => Ok(Self::Standard),
            "bulk" => Ok(Self::Bulk),
            other => Err(format!(
                "Unknown restore tier {} (expected expedited, standard, or bulk)",
                other
            )),
        }
    }
}

/// Metadata describing one remote object
#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub storage_class: StorageClass,
    /// An archival retrieval was requested and has not completed yet
    pub ongoing_restore: bool,
    pub size: u64,
}

/// One page of a (possibly truncated) listing
#[derive(Debug, Clone, Default)]
pub struct ObjectListing {
    pub keys: Vec<String>,
    pub truncated: bool,
    pub continuation: Option<String>,
}

/// Errors surfaced by an object store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist; callers handle this differently from
    /// transport failures
    #[error("object not found")]
    NotFound,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for object store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Abstract capability the jobs consume; implemented by the production S3
/// client and by [`DirectoryStore`]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file; either fully succeeds or fails atomically from
    /// the caller's view. `on_progress` receives cumulative bytes.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        file: &Path,
        storage_class: StorageClass,
        on_progress: &mut dyn FnMut(u64),
    ) -> StoreResult<()>;

    /// Fetch metadata for one object
    fn get_object_metadata(&self, bucket: &str, key: &str) -> StoreResult<ObjectMetadata>;

    /// List one page of keys under a prefix; callers must keep paging while
    /// `truncated` is set
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> StoreResult<ObjectListing>;

    /// Request an archival thaw; fire-and-forget, does not block until done
    fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        tier: RestoreTier,
        retention_days: u32,
    ) -> StoreResult<()>;

    /// Download an object to a local file. `on_progress` receives cumulative
    /// bytes.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
        on_progress: &mut dyn FnMut(u64),
    ) -> StoreResult<()>;
}
