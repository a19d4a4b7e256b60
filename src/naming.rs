//! Mapping between local volume filenames and remote object keys
//!
//! Every uploaded volume is stored under a key of the form
//! `bb-<jobId>-<volumeName>.enc`, so both the owning job and the original
//! filename can be recovered from the key alone.

use crate::error::{StorageError, StorageResult};

/// Prefix shared by every object key this tool writes
pub const KEY_PREFIX: &str = "bb-";

/// Suffix shared by every object key this tool writes
pub const KEY_SUFFIX: &str = ".enc";

/// Build the object key for one volume of one job
pub fn object_key(job_id: &str, volume_name: &str) -> String {
    format!("{}{}-{}{}", KEY_PREFIX, job_id, volume_name, KEY_SUFFIX)
}

/// Build the object key for a `jobId-VOLNAME` pair as passed on the command line
pub fn object_key_for_pair(pair: &str) -> String {
    format!("{}{}{}", KEY_PREFIX, pair, KEY_SUFFIX)
}

/// Build the listing prefix covering every volume of one job
pub fn job_prefix(job_id: &str) -> String {
    format!("{}{}-", KEY_PREFIX, job_id)
}

/// Recover `(jobId, volumeName)` from an object key
///
/// Keys that do not match `bb-<digits>-<name>.enc` are a job failure: the
/// bucket should never contain foreign objects under our prefix, and guessing
/// at a fallback would decrypt the wrong data to the wrong place.
pub fn parse_object_key(key: &str) -> StorageResult<(&str, &str)> {
    let mismatch = || {
        StorageError::Store(format!(
            "Object {} does not match the pattern bb-jobId-VOLUMENAME.enc",
            key
        ))
    };

    let rest = key
        .strip_prefix(KEY_PREFIX)
        .and_then(|r| r.strip_suffix(KEY_SUFFIX))
        .ok_or_else(mismatch)?;

    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return Err(mismatch());
    }

    let (job_id, tail) = rest.split_at(digits);
    let volume_name = tail.strip_prefix('-').ok_or_else(mismatch)?;
    if volume_name.is_empty() {
        return Err(mismatch());
    }

    Ok((job_id, volume_name))
}
