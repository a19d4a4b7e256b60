//! Backup job: encrypt volumes and move them into the object store
//!
//! Each volume is encrypted to a temporary sibling file, uploaded under its
//! object key, and only then deleted from local disk. The temporary
//! ciphertext is removed on every exit path; the plaintext source is removed
//! only after the store confirmed the upload.

use std::fs;

use crate::crypto::encrypt_file;
use crate::error::{StorageError, StorageResult};
use crate::fsutil::RemoveOnDrop;
use crate::job::{collect_failures, map_parallel, JobContext};
use crate::naming;
use crate::progress::{ProgressReporter, TRANSFER_REPORT_INTERVAL};
use crate::store::StorageClass;

/// Uploads the volumes of one backup job
#[derive(Debug)]
pub struct BackupJob {
    job_id: String,
    volume_names: Vec<String>,
}

impl BackupJob {
    /// Parse the job arguments: a numeric job id followed by volume names
    ///
    /// Bareos hands volume lists over as a single pipe-delimited string in
    /// some run-script configurations, so each argument is expanded on `|`
    /// and blank entries are dropped.
    pub fn from_args(args: &[String]) -> StorageResult<Self> {
        let (job_id, volumes) = args
            .split_first()
            .ok_or_else(|| StorageError::BadArgs("Missing required Job ID".to_string()))?;

        if !is_numeric_id(job_id) {
            return Err(StorageError::BadArgs(format!(
                "Job ID must be numeric; was {}",
                job_id
            )));
        }

        let volume_names = expand_volume_names(volumes);
        if volume_names.is_empty() {
            return Err(StorageError::BadArgs(format!(
                "No volume names given for job {}",
                job_id
            )));
        }

        Ok(Self {
            job_id: job_id.clone(),
            volume_names,
        })
    }

    /// Encrypt and upload every volume, then delete the local copies
    pub fn run(&self, ctx: &JobContext) -> StorageResult<()> {
        println!("Now uploading volumes {:?}", self.volume_names);

        let results = map_parallel(&self.volume_names, |volume| {
            self.upload_and_remove(ctx, volume)
        });
        collect_failures(&self.volume_names, results)?;

        println!("Done uploading {} volumes...", self.volume_names.len());
        Ok(())
    }

    fn upload_and_remove(&self, ctx: &JobContext, volume: &str) -> StorageResult<()> {
        let source = ctx.scratch_dir.join(volume);
        if !source.exists() {
            return Err(StorageError::VolumeMissing(format!(
                "Could not find volume {} in {}",
                volume,
                ctx.scratch_dir.display()
            )));
        }

        let key = naming::object_key(&self.job_id, volume);
        let encrypted = ctx.scratch_dir.join(&key);
        // Ciphertext temp file goes away on success and failure alike
        let _cleanup = RemoveOnDrop::new(&encrypted);

        println!("Encrypting volume {}", volume);
        encrypt_file(&ctx.keys, &source, &encrypted)?;

        println!("Uploading volume {} as {}", volume, key);
        let total = fs::metadata(&encrypted)
            .map_err(|e| {
                StorageError::Io(format!("Failed to stat {}: {}", encrypted.display(), e))
            })?
            .len();
        let mut reporter = ProgressReporter::new(&key, "Upload", total, TRANSFER_REPORT_INTERVAL);
        ctx.store
            .put_object(
                &ctx.bucket,
                &key,
                &encrypted,
                StorageClass::OneZoneIa,
                &mut |transferred| reporter.set_bytes(transferred),
            )
            .map_err(|e| StorageError::Store(format!("Failed to upload {}: {}", key, e)))?;
        reporter.done();
        println!("[OK] Uploaded {} as {}", volume, key);

        // Upload confirmed; the plaintext source can finally go
        fs::remove_file(&source)
            .map_err(|e| StorageError::Io(format!("Failed to delete {}: {}", source.display(), e)))
    }
}

fn is_numeric_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

fn expand_volume_names(args: &[String]) -> Vec<String> {
    args.iter()
        .flat_map(|arg| arg.split('|'))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}
