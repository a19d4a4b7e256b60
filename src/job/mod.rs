//! Job orchestration
//!
//! One process runs exactly one job: a backup, or one of the two restore
//! shapes. Jobs share a [`JobContext`] carrying the object store handle, the
//! key manager, and the scratch directory, and fan out over their volumes on
//! a bounded worker pool that always finishes every volume before reporting
//! the collected failures.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::crypto::KeyManager;
use crate::error::{StorageError, StorageResult};
use crate::store::{ObjectStore, RestoreTier};

pub mod backup;
pub mod restore;

pub use backup::BackupJob;
pub use restore::{RestoreJobsJob, RestoreVolumesJob};

/// Everything a job needs to run
pub struct JobContext {
    /// Object store collaborator
    pub store: Arc<dyn ObjectStore>,
    /// Bucket holding the encrypted volumes
    pub bucket: String,
    /// Key manager for the configured passphrase
    pub keys: KeyManager,
    /// Directory volumes are read from and restored to; temp files live here
    pub scratch_dir: PathBuf,
    /// Tier for archival thaw requests
    pub restore_tier: RestoreTier,
    /// Retention window for thawed copies, in days
    pub restore_retention_days: u32,
}

/// Apply `f` to every item on a bounded worker pool, preserving input order
///
/// Workers pull the next index from a shared counter, so the pool stays busy
/// regardless of how unevenly sized the volumes are. Every item is attempted;
/// a failing item never aborts its siblings.
pub(crate) fn map_parallel<T, R, F>(items: &[T], f: F) -> Vec<StorageResult<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> StorageResult<R> + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }

    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
        .min(items.len());

    let next = AtomicUsize::new(0);
    let collected: Mutex<Vec<(usize, StorageResult<R>)>> =
        Mutex::new(Vec::with_capacity(items.len()));

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                if index >= items.len() {
                    break;
                }
                let result = f(&items[index]);
                collected
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push((index, result));
            });
        }
    });

    let mut results = collected
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

/// Pair results back up with their item names, collecting all failures into
/// a single job failure
pub(crate) fn collect_failures<R>(
    names: &[String],
    results: Vec<StorageResult<R>>,
) -> StorageResult<Vec<R>> {
    let mut values = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(value) => values.push(value),
            Err(err) => failures.push((name.clone(), err)),
        }
    }
    if failures.is_empty() {
        Ok(values)
    } else {
        Err(StorageError::VolumeFailures(failures))
    }
}
