//! Local-directory object store
//!
//! Objects live at `<root>/<bucket>/<key>`; storage class and restore state
//! are kept in JSON sidecars under `<root>/<bucket>/.meta/<key>.json`. The
//! sidecars let a plain directory stand in for the remote collaborator,
//! archival tiers and all, which is what the test suite and local dry runs
//! drive the jobs against.
//!
//! Thaws never complete on their own here, matching how the jobs treat the
//! archival wait as opaque. [`DirectoryStore::complete_restore`] promotes an
//! object back to standard storage, standing in for the remote side
//! finishing a retrieval; [`DirectoryStore::set_storage_class`] stands in
//! for a lifecycle transition.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    ObjectListing, ObjectMetadata, ObjectStore, RestoreTier, StorageClass, StoreError, StoreResult,
};

const DEFAULT_PAGE_SIZE: usize = 1000;
const COPY_CHUNK: usize = 64 * 1024;
const META_DIR: &str = ".meta";

/// Per-object sidecar state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    storage_class: StorageClass,
    #[serde(default)]
    ongoing_restore: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    restore_tier: Option<RestoreTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    restore_retention_days: Option<u32>,
}

impl Default for Sidecar {
    fn default() -> Self {
        Self {
            storage_class: StorageClass::Standard,
            ongoing_restore: false,
            restore_tier: None,
            restore_retention_days: None,
        }
    }
}

/// Object store backed by a local directory tree
pub struct DirectoryStore {
    root: PathBuf,
    page_size: usize,
}

impl DirectoryStore {
    /// Create a store rooted at `root`; buckets are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Create a store with a custom listing page size
    pub fn with_page_size(root: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            root: root.into(),
            page_size: page_size.max(1),
        }
    }

    /// Mark an object as having moved to another storage class, as a bucket
    /// lifecycle policy would
    pub fn set_storage_class(
        &self,
        bucket: &str,
        key: &str,
        storage_class: StorageClass,
    ) -> StoreResult<()> {
        let mut sidecar = self.read_sidecar(bucket, key)?;
        sidecar.storage_class = storage_class;
        self.write_sidecar(bucket, key, &sidecar)
    }

    /// Finish a pending archival retrieval: the object becomes immediately
    /// readable again
    pub fn complete_restore(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let mut sidecar = self.read_sidecar(bucket, key)?;
        sidecar.storage_class = StorageClass::Standard;
        sidecar.ongoing_restore = false;
        self.write_sidecar(bucket, key, &sidecar)
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        validate_name(bucket)?;
        validate_name(key)?;
        Ok(self.root.join(bucket).join(key))
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        validate_name(bucket)?;
        validate_name(key)?;
        Ok(self
            .root
            .join(bucket)
            .join(META_DIR)
            .join(format!("{}.json", key)))
    }

    fn read_sidecar(&self, bucket: &str, key: &str) -> StoreResult<Sidecar> {
        if !self.object_path(bucket, key)?.exists() {
            return Err(StoreError::NotFound);
        }
        let path = self.sidecar_path(bucket, key)?;
        if !path.exists() {
            return Ok(Sidecar::default());
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| StoreError::Other(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| StoreError::Other(format!("Failed to parse {}: {}", path.display(), e)))
    }

    fn write_sidecar(&self, bucket: &str, key: &str, sidecar: &Sidecar) -> StoreResult<()> {
        let path = self.sidecar_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::Other(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(sidecar)
            .map_err(|e| StoreError::Other(format!("Failed to serialize metadata: {}", e)))?;
        fs::write(&path, json)
            .map_err(|e| StoreError::Other(format!("Failed to write {}: {}", path.display(), e)))
    }
}

impl ObjectStore for DirectoryStore {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        file: &Path,
        storage_class: StorageClass,
        on_progress: &mut dyn FnMut(u64),
    ) -> StoreResult<()> {
        let dest = self.object_path(bucket, key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::Other(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        copy_with_progress(file, &dest, on_progress)?;
        self.write_sidecar(
            bucket,
            key,
            &Sidecar {
                storage_class,
                ..Sidecar::default()
            },
        )
    }

    fn get_object_metadata(&self, bucket: &str, key: &str) -> StoreResult<ObjectMetadata> {
        let path = self.object_path(bucket, key)?;
        if !path.exists() {
            return Err(StoreError::NotFound);
        }
        let size = fs::metadata(&path)
            .map_err(|e| StoreError::Other(format!("Failed to stat {}: {}", path.display(), e)))?
            .len();
        let sidecar = self.read_sidecar(bucket, key)?;
        Ok(ObjectMetadata {
            storage_class: sidecar.storage_class,
            ongoing_restore: sidecar.ongoing_restore,
            size,
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> StoreResult<ObjectListing> {
        validate_name(bucket)?;
        let dir = self.root.join(bucket);
        if !dir.exists() {
            return Ok(ObjectListing::default());
        }

        let mut keys = Vec::new();
        let entries = fs::read_dir(&dir)
            .map_err(|e| StoreError::Other(format!("Failed to list {}: {}", dir.display(), e)))?;
        for entry in entries {
            let entry = entry
                .map_err(|e| StoreError::Other(format!("Failed to list {}: {}", dir.display(), e)))?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.starts_with(prefix) {
                continue;
            }
            keys.push(name);
        }
        keys.sort();

        let start = match continuation {
            Some(token) => keys.partition_point(|k| k.as_str() <= token),
            None => 0,
        };
        let page: Vec<String> = keys[start..].iter().take(self.page_size).cloned().collect();
        let truncated = start + page.len() < keys.len();
        let continuation = if truncated { page.last().cloned() } else { None };

        Ok(ObjectListing {
            keys: page,
            truncated,
            continuation,
        })
    }

    fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        tier: RestoreTier,
        retention_days: u32,
    ) -> StoreResult<()> {
        let mut sidecar = self.read_sidecar(bucket, key)?;
        if !sidecar.storage_class.is_archival() {
            return Err(StoreError::Other(format!(
                "Object {} is in storage class {} and does not need a restore",
                key, sidecar.storage_class
            )));
        }
        sidecar.ongoing_restore = true;
        sidecar.restore_tier = Some(tier);
        sidecar.restore_retention_days = Some(retention_days);
        self.write_sidecar(bucket, key, &sidecar)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
        on_progress: &mut dyn FnMut(u64),
    ) -> StoreResult<()> {
        let src = self.object_path(bucket, key)?;
        if !src.exists() {
            return Err(StoreError::NotFound);
        }
        copy_with_progress(&src, dest, on_progress)
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
    {
        return Err(StoreError::Other(format!(
            "Invalid bucket or object name: {:?}",
            name
        )));
    }
    Ok(())
}

fn copy_with_progress(
    src: &Path,
    dest: &Path,
    on_progress: &mut dyn FnMut(u64),
) -> StoreResult<()> {
    let mut reader = File::open(src)
        .map_err(|e| StoreError::Other(format!("Failed to open {}: {}", src.display(), e)))?;
    let mut writer = File::create(dest)
        .map_err(|e| StoreError::Other(format!("Failed to create {}: {}", dest.display(), e)))?;

    let mut buffer = vec![0u8; COPY_CHUNK];
    let mut transferred: u64 = 0;
    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| StoreError::Other(format!("Failed to read {}: {}", src.display(), e)))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buffer[..n])
            .map_err(|e| StoreError::Other(format!("Failed to write {}: {}", dest.display(), e)))?;
        transferred += n as u64;
        on_progress(transferred);
    }
    writer
        .flush()
        .map_err(|e| StoreError::Other(format!("Failed to write {}: {}", dest.display(), e)))
}
