//! Restore jobs: thaw, download, decrypt
//!
//! Both restore shapes (explicit jobId-VOLNAME pairs, or whole jobs by id)
//! feed the same engine. The engine sorts every requested object into one of
//! three buckets before any download starts: already on local disk, held in
//! an archival tier, or ready to fetch. Archival objects get a thaw request
//! and fail the whole invocation with one consolidated error, because a
//! partial volume set is useless to a Bareos restore job.

use std::fmt;
use std::path::PathBuf;

use crate::crypto::decrypt_file;
use crate::error::{StorageError, StorageResult};
use crate::fsutil::RemoveOnDrop;
use crate::job::{collect_failures, map_parallel, JobContext};
use crate::naming;
use crate::progress::{ProgressReporter, TRANSFER_REPORT_INTERVAL};
use crate::store::{ObjectMetadata, StoreError};

/// One object that is ready to be downloaded and decrypted
struct RestoreTarget {
    key: String,
    job_id: String,
    volume_name: String,
    output: PathBuf,
    size: u64,
}

impl fmt::Display for RestoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {}, volume {}", self.job_id, self.volume_name)
    }
}

/// Restore a list of explicit `jobId-VOLNAME` pairs
#[derive(Debug)]
pub struct RestoreVolumesJob {
    pairs: Vec<String>,
}

impl RestoreVolumesJob {
    /// Parse the job arguments: one or more `jobId-VOLNAME` pairs
    pub fn from_args(args: &[String]) -> StorageResult<Self> {
        if args.is_empty() {
            return Err(StorageError::BadArgs(
                "No jobId-VOLNAME pairs given".to_string(),
            ));
        }
        Ok(Self {
            pairs: args.to_vec(),
        })
    }

    /// Check every requested object exists, then run the restore engine
    pub fn run(&self, ctx: &JobContext) -> StorageResult<()> {
        println!("Now checking status of S3 objects: {:?}", self.pairs);

        let mut not_found = Vec::new();
        let mut objects = Vec::new();
        for pair in &self.pairs {
            let key = naming::object_key_for_pair(pair);
            match ctx.store.get_object_metadata(&ctx.bucket, &key) {
                Ok(metadata) => objects.push((key, metadata)),
                Err(StoreError::NotFound) => not_found.push(key),
                Err(e) => {
                    return Err(StorageError::Store(format!(
                        "Failed to read metadata for {}: {}",
                        key, e
                    )))
                }
            }
        }

        if !not_found.is_empty() {
            return Err(StorageError::VolumeMissing(format!(
                "Your restore operation could not be completed because the following objects \
                 could not be found:\n  {}\n\nCheck for typos in the jobId-VOLNAME pairs listed \
                 above.\nAlso, check your bucket's configured retention policy to make sure your \
                 objects weren't deleted early.\nUnfortunately, in the latter case, this error \
                 means that your data is already gone.",
                not_found.join("\n  ")
            )));
        }

        restore_objects(ctx, objects)
    }
}

/// Restore every volume uploaded for a list of job ids
#[derive(Debug)]
pub struct RestoreJobsJob {
    job_ids: Vec<String>,
}

impl RestoreJobsJob {
    /// Parse the job arguments: one or more numeric job ids
    pub fn from_args(args: &[String]) -> StorageResult<Self> {
        if args.is_empty() {
            return Err(StorageError::BadArgs("No job IDs given".to_string()));
        }
        for job_id in args {
            if job_id.is_empty() || !job_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(StorageError::BadArgs(format!(
                    "Malformed jobId (should be numeric): {}",
                    job_id
                )));
            }
        }
        Ok(Self {
            job_ids: args.to_vec(),
        })
    }

    /// List each job's objects, fetch their statuses, and run the engine
    pub fn run(&self, ctx: &JobContext) -> StorageResult<()> {
        println!("Now searching for S3 objects for job(s): {:?}", self.job_ids);

        let mut keys = Vec::new();
        for job_id in &self.job_ids {
            let found = list_job_objects(ctx, job_id, &mut keys)?;
            if found == 0 {
                return Err(StorageError::JobNotFound(format!(
                    "Could not find any volumes for job {}",
                    job_id
                )));
            }
        }

        println!("Found the following {} objects to be restored:", keys.len());
        for key in &keys {
            println!("  {}", key);
        }
        println!();

        println!("Checking statuses of the objects...");
        let results = map_parallel(&keys, |key| {
            ctx.store
                .get_object_metadata(&ctx.bucket, key)
                .map_err(|e| {
                    StorageError::Store(format!("Failed to read metadata for {}: {}", key, e))
                })
        });
        let metadata = collect_failures(&keys, results)?;

        restore_objects(ctx, keys.into_iter().zip(metadata).collect())
    }
}

/// Page through the listing for one job's prefix, appending every key
fn list_job_objects(ctx: &JobContext, job_id: &str, keys: &mut Vec<String>) -> StorageResult<usize> {
    let prefix = naming::job_prefix(job_id);
    let mut found = 0;
    let mut continuation: Option<String> = None;
    loop {
        let listing = ctx
            .store
            .list_objects(&ctx.bucket, &prefix, continuation.as_deref())
            .map_err(|e| {
                StorageError::Store(format!("Failed to list objects under {}: {}", prefix, e))
            })?;
        found += listing.keys.len();
        keys.extend(listing.keys);

        if !listing.truncated {
            return Ok(found);
        }
        continuation = listing.continuation;
        if continuation.is_none() {
            return Err(StorageError::Store(format!(
                "Listing under {} reported truncated but gave no continuation token",
                prefix
            )));
        }
    }
}

/// The shared restore engine: partition, thaw, then fetch in parallel
fn restore_objects(
    ctx: &JobContext,
    objects: Vec<(String, ObjectMetadata)>,
) -> StorageResult<()> {
    let total = objects.len();
    let mut ongoing_restores = Vec::new();
    let mut already_on_disk = Vec::new();
    let mut to_restore = Vec::new();

    for (key, metadata) in &objects {
        let (job_id, volume_name) = naming::parse_object_key(key)?;
        let output = ctx.scratch_dir.join(volume_name);

        if output.exists() {
            // Idempotent re-runs: never clobber a volume that is already back
            eprintln!(
                "[job {}, volume {}] Skipping download; file already present on local disk.",
                job_id, volume_name
            );
            already_on_disk.push(output);
            continue;
        }

        if metadata.storage_class.is_archival() {
            if metadata.ongoing_restore {
                println!(
                    "Restore of object {} from the archival tier is already underway, but not \
                     yet complete.",
                    key
                );
            } else {
                ctx.store
                    .restore_object(
                        &ctx.bucket,
                        key,
                        ctx.restore_tier,
                        ctx.restore_retention_days,
                    )
                    .map_err(|e| {
                        StorageError::Store(format!(
                            "Failed to request a restore of {}: {}",
                            key, e
                        ))
                    })?;
                println!(
                    "Started restore of object {} from the archival tier (eta: {})",
                    key,
                    ctx.restore_tier.expected_wait()
                );
            }
            ongoing_restores.push(key.clone());
        } else {
            to_restore.push(RestoreTarget {
                key: key.clone(),
                job_id: job_id.to_string(),
                volume_name: volume_name.to_string(),
                output,
                size: metadata.size,
            });
        }
    }

    if !ongoing_restores.is_empty() {
        return Err(StorageError::RestoreInProgress(format!(
            "Your restore job cannot be completed right now because some of the requested \
             volumes were migrated to the archival storage tier.\nRestores were started (or were \
             already running) for the following objects:\n  {}\n\nPlease try re-running the \
             restore job after {} (but don't wait more than {} days!)",
            ongoing_restores.join("\n  "),
            ctx.restore_tier.expected_wait(),
            ctx.restore_retention_days
        )));
    }

    println!("Restoring {} objects to local disk...", total);

    let names: Vec<String> = to_restore.iter().map(|t| t.volume_name.clone()).collect();
    let results = map_parallel(&to_restore, |target| fetch_and_decrypt(ctx, target));
    collect_failures(&names, results)?;

    println!();
    println!("Restore operation has completed successfully!");
    if !already_on_disk.is_empty() {
        println!();
        println!("The following volumes were found on local disk:");
        for path in &already_on_disk {
            println!("  {}", path.display());
        }
    }
    if !to_restore.is_empty() {
        println!();
        println!("The following volumes were restored to local disk:");
        for target in &to_restore {
            println!("  {}", target.output.display());
        }
    }
    println!();
    println!("You can now start your restore job in the Bareos console!");
    Ok(())
}

/// Download one object to a guarded temp file and decrypt it into place
fn fetch_and_decrypt(ctx: &JobContext, target: &RestoreTarget) -> StorageResult<()> {
    println!("Retrieving: {}", target);

    let temp = ctx
        .scratch_dir
        .join(format!("{}.enc", target.volume_name));
    let _cleanup = RemoveOnDrop::new(&temp);

    println!("Downloading {}", target.key);
    let mut reporter = ProgressReporter::new(
        &target.volume_name,
        "Download",
        target.size,
        TRANSFER_REPORT_INTERVAL,
    );
    ctx.store
        .get_object(&ctx.bucket, &target.key, &temp, &mut |transferred| {
            reporter.set_bytes(transferred)
        })
        .map_err(|e| StorageError::Store(format!("Failed to download {}: {}", target.key, e)))?;
    reporter.done();

    println!("Decrypting {}", target.volume_name);
    decrypt_file(&ctx.keys, &temp, &target.output)?;

    println!("[OK] Retrieved {}", target);
    Ok(())
}
