//! Encrypted volume file format
//!
//! Every encrypted volume starts with a fixed 512-byte header:
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 13   | magic `"BAREOS-S3-ENC"` (ASCII)         |
//! | 13     | 2    | format version (u16, big-endian)        |
//! | 15     | 24   | AES-KW wrapped session key              |
//! | 39     | 12   | AES-GCM nonce                           |
//! | 51     | 461  | zero padding                            |
//!
//! The header is followed by the AES-128-GCM ciphertext of the volume and a
//! 16-byte authentication tag. Any byte alteration anywhere in the file makes
//! decryption fail, and a failed decryption never leaves plaintext behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use subtle::ConstantTimeEq;

use crate::crypto::gcm::{GcmStream, TAG_SIZE};
use crate::crypto::keys::{KeyManager, NONCE_SIZE, WRAPPED_KEY_SIZE};
use crate::error::{StorageError, StorageResult};
use crate::fsutil::{file_name, RemoveOnDrop};
use crate::progress::{ProgressReporter, CRYPTO_REPORT_INTERVAL};

/// Total size of the file header in bytes
pub const HEADER_SIZE: usize = 512;

/// Magic bytes identifying our files
pub const MAGIC: &[u8; 13] = b"BAREOS-S3-ENC";

/// Current file format version
pub const FILE_VERSION: u16 = 1;

const VERSION_OFFSET: usize = MAGIC.len();
const WRAPPED_KEY_OFFSET: usize = VERSION_OFFSET + 2;
const NONCE_OFFSET: usize = WRAPPED_KEY_OFFSET + WRAPPED_KEY_SIZE;

/// Single-invocation AES-GCM stays well clear of its 2^39 - 256 bit limit
const MAX_INPUT_BYTES: u64 = 64 * 1024 * 1024 * 1024;

/// Fixed working buffer; memory use is independent of volume size
const CHUNK_SIZE: usize = 64 * 1024;

/// Encrypt a volume file into the envelope format
///
/// Generates a fresh session key and nonce, writes the header, then streams
/// the plaintext through AES-128-GCM and appends the authentication tag.
pub fn encrypt_file(keys: &KeyManager, src: &Path, dst: &Path) -> StorageResult<()> {
    let src_len = fs::metadata(src)
        .map_err(|e| StorageError::Io(format!("Failed to stat {}: {}", src.display(), e)))?
        .len();
    if src_len > MAX_INPUT_BYTES {
        return Err(StorageError::VolumeTooLarge(format!(
            "{} is larger than 64GB, which is more than a single AES-GCM pass can safely \
             protect. Consider setting a maximum volume size on your file device in Bareos.",
            file_name(src)
        )));
    }

    let session_key = keys.new_session_key();
    let nonce = keys.new_nonce();
    let wrapped_key = keys.wrap(&session_key)?;

    let mut header = [0u8; HEADER_SIZE];
    header[..MAGIC.len()].copy_from_slice(MAGIC);
    header[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&FILE_VERSION.to_be_bytes());
    header[WRAPPED_KEY_OFFSET..WRAPPED_KEY_OFFSET + WRAPPED_KEY_SIZE]
        .copy_from_slice(&wrapped_key);
    header[NONCE_OFFSET..NONCE_OFFSET + NONCE_SIZE].copy_from_slice(&nonce);

    let mut reader = BufReader::new(
        File::open(src)
            .map_err(|e| StorageError::Io(format!("Failed to open {}: {}", src.display(), e)))?,
    );
    let mut guard = RemoveOnDrop::new(dst);
    let mut writer = BufWriter::new(
        File::create(dst)
            .map_err(|e| StorageError::Io(format!("Failed to create {}: {}", dst.display(), e)))?,
    );

    writer
        .write_all(&header)
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", dst.display(), e)))?;

    let mut cipher = GcmStream::new(&session_key, &nonce);
    let mut reporter =
        ProgressReporter::new(&file_name(src), "Encrypt", src_len, CRYPTO_REPORT_INTERVAL);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", src.display(), e)))?;
        if n == 0 {
            break;
        }
        cipher.encrypt_chunk(&mut buffer[..n]);
        writer
            .write_all(&buffer[..n])
            .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", dst.display(), e)))?;
        reporter.add_bytes(n as u64);
    }

    writer
        .write_all(&cipher.finish())
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", dst.display(), e)))?;
    writer
        .flush()
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", dst.display(), e)))?;
    reporter.done();
    guard.disarm();
    Ok(())
}

/// Decrypt an envelope file back to the plaintext volume
///
/// Validates the header, unwraps the session key, streams the ciphertext
/// through AES-128-GCM, and verifies the authentication tag. On any failure
/// the partially written output is deleted before the error propagates.
pub fn decrypt_file(keys: &KeyManager, src: &Path, dst: &Path) -> StorageResult<()> {
    let src_len = fs::metadata(src)
        .map_err(|e| StorageError::Io(format!("Failed to stat {}: {}", src.display(), e)))?
        .len();
    if src_len < (HEADER_SIZE + TAG_SIZE) as u64 {
        return Err(StorageError::NotEncryptedVolume(format!(
            "{} is too short to be an encrypted backup file",
            file_name(src)
        )));
    }

    let mut reader = BufReader::new(
        File::open(src)
            .map_err(|e| StorageError::Io(format!("Failed to open {}: {}", src.display(), e)))?,
    );
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", src.display(), e)))?;

    if &header[..MAGIC.len()] != MAGIC {
        return Err(StorageError::NotEncryptedVolume(format!(
            "{} doesn't appear to be an encrypted backup file (wrong magic at file start)",
            file_name(src)
        )));
    }

    let version = u16::from_be_bytes([header[VERSION_OFFSET], header[VERSION_OFFSET + 1]]);
    match version {
        1 => decrypt_v1(keys, &header, &mut reader, src, src_len, dst),
        _ => Err(StorageError::UnsupportedVersion {
            file: file_name(src),
            version,
        }),
    }
}

fn decrypt_v1(
    keys: &KeyManager,
    header: &[u8; HEADER_SIZE],
    reader: &mut BufReader<File>,
    src: &Path,
    src_len: u64,
    dst: &Path,
) -> StorageResult<()> {
    let mut wrapped_key = [0u8; WRAPPED_KEY_SIZE];
    wrapped_key.copy_from_slice(&header[WRAPPED_KEY_OFFSET..WRAPPED_KEY_OFFSET + WRAPPED_KEY_SIZE]);
    let session_key = keys.unwrap_key(&wrapped_key)?;

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&header[NONCE_OFFSET..NONCE_OFFSET + NONCE_SIZE]);

    let mut guard = RemoveOnDrop::new(dst);
    let mut writer = BufWriter::new(
        File::create(dst)
            .map_err(|e| StorageError::Io(format!("Failed to create {}: {}", dst.display(), e)))?,
    );

    let mut cipher = GcmStream::new(&session_key, &nonce);
    let mut reporter =
        ProgressReporter::new(&file_name(src), "Decrypt", src_len, CRYPTO_REPORT_INTERVAL);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut remaining = src_len - (HEADER_SIZE + TAG_SIZE) as u64;
    while remaining > 0 {
        let want = CHUNK_SIZE.min(remaining as usize);
        reader
            .read_exact(&mut buffer[..want])
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", src.display(), e)))?;
        cipher.decrypt_chunk(&mut buffer[..want]);
        writer
            .write_all(&buffer[..want])
            .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", dst.display(), e)))?;
        remaining -= want as u64;
        reporter.add_bytes(want as u64);
    }

    let mut stored_tag = [0u8; TAG_SIZE];
    reader
        .read_exact(&mut stored_tag)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", src.display(), e)))?;

    writer
        .flush()
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", dst.display(), e)))?;

    let computed_tag = cipher.finish();
    if computed_tag.ct_eq(&stored_tag).unwrap_u8() == 0 {
        // Decrypted contents fail the auth check; the guard drops the output
        // rather than leaving unverified plaintext lying about.
        return Err(StorageError::IntegrityCheckFailed(format!(
            "{} failed its integrity check",
            file_name(dst)
        )));
    }

    reporter.done();
    guard.disarm();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_volume(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn sample_contents() -> Vec<u8> {
        (0..100_000u32).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let contents = sample_contents();
        let src = write_volume(&dir, "VOL-0001", &contents);
        let enc = dir.path().join("VOL-0001.enc");
        let out = dir.path().join("VOL-0001.out");

        encrypt_file(&keys, &src, &enc).unwrap();
        decrypt_file(&keys, &enc, &out).unwrap();

        assert_eq!(fs::read(&out).unwrap(), contents);
    }

    #[test]
    fn test_header_layout() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let contents = sample_contents();
        let src = write_volume(&dir, "VOL-0001", &contents);
        let enc = dir.path().join("VOL-0001.enc");

        encrypt_file(&keys, &src, &enc).unwrap();
        let encrypted = fs::read(&enc).unwrap();

        assert_eq!(&encrypted[..13], MAGIC);
        assert_eq!(&encrypted[13..15], &1u16.to_be_bytes());
        // Ciphertext length equals plaintext length; GCM adds no padding
        assert_eq!(
            encrypted.len(),
            HEADER_SIZE + contents.len() + TAG_SIZE
        );
        // The padding area is all zeros
        assert!(encrypted[NONCE_OFFSET + NONCE_SIZE..HEADER_SIZE]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn test_empty_volume_round_trip() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let src = write_volume(&dir, "EMPTY", b"");
        let enc = dir.path().join("EMPTY.enc");
        let out = dir.path().join("EMPTY.out");

        encrypt_file(&keys, &src, &enc).unwrap();
        assert_eq!(
            fs::metadata(&enc).unwrap().len(),
            (HEADER_SIZE + TAG_SIZE) as u64
        );
        decrypt_file(&keys, &enc, &out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"");
    }

    #[test]
    fn test_wrong_passphrase_is_integrity_error() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let wrong = KeyManager::new("wrong key");
        let src = write_volume(&dir, "VOL-0001", &sample_contents());
        let enc = dir.path().join("VOL-0001.enc");
        let out = dir.path().join("VOL-0001.out");

        encrypt_file(&keys, &src, &enc).unwrap();
        let err = decrypt_file(&wrong, &enc, &out).unwrap_err();

        assert!(err.is_integrity_failure());
        assert!(err.to_string().contains("passphrase"));
        assert!(!out.exists());
    }

    #[test]
    fn test_tampered_ciphertext_deletes_output() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let src = write_volume(&dir, "VOL-0001", &sample_contents());
        let enc = dir.path().join("VOL-0001.enc");
        let out = dir.path().join("VOL-0001.out");

        encrypt_file(&keys, &src, &enc).unwrap();
        let mut encrypted = fs::read(&enc).unwrap();
        encrypted[HEADER_SIZE + 17] ^= 0xff;
        fs::write(&enc, &encrypted).unwrap();

        let err = decrypt_file(&keys, &enc, &out).unwrap_err();
        assert!(err.is_integrity_failure());
        assert!(!out.exists());
    }

    #[test]
    fn test_tampered_nonce_deletes_output() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let src = write_volume(&dir, "VOL-0001", &sample_contents());
        let enc = dir.path().join("VOL-0001.enc");
        let out = dir.path().join("VOL-0001.out");

        encrypt_file(&keys, &src, &enc).unwrap();
        let mut encrypted = fs::read(&enc).unwrap();
        encrypted[NONCE_OFFSET + 4] ^= 0xff;
        fs::write(&enc, &encrypted).unwrap();

        let err = decrypt_file(&keys, &enc, &out).unwrap_err();
        assert!(err.is_integrity_failure());
        assert!(!out.exists());
    }

    #[test]
    fn test_tampered_tag_deletes_output() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let src = write_volume(&dir, "VOL-0001", &sample_contents());
        let enc = dir.path().join("VOL-0001.enc");
        let out = dir.path().join("VOL-0001.out");

        encrypt_file(&keys, &src, &enc).unwrap();
        let mut encrypted = fs::read(&enc).unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xff;
        fs::write(&enc, &encrypted).unwrap();

        let err = decrypt_file(&keys, &enc, &out).unwrap_err();
        assert!(err.is_integrity_failure());
        assert!(!out.exists());
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let bogus = write_volume(&dir, "bogus.enc", &vec![0u8; HEADER_SIZE + TAG_SIZE]);
        let out = dir.path().join("bogus.out");

        let err = decrypt_file(&keys, &bogus, &out).unwrap_err();
        assert!(matches!(err, StorageError::NotEncryptedVolume(_)));
        assert!(err.to_string().contains("wrong magic"));
        assert!(!out.exists());
    }

    #[test]
    fn test_short_file_rejected() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let short = write_volume(&dir, "short.enc", b"way too small");
        let out = dir.path().join("short.out");

        let err = decrypt_file(&keys, &short, &out).unwrap_err();
        assert!(matches!(err, StorageError::NotEncryptedVolume(_)));
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let src = write_volume(&dir, "VOL-0001", &sample_contents());
        let enc = dir.path().join("VOL-0001.enc");
        let out = dir.path().join("VOL-0001.out");

        encrypt_file(&keys, &src, &enc).unwrap();
        let mut encrypted = fs::read(&enc).unwrap();
        encrypted[13..15].copy_from_slice(&9u16.to_be_bytes());
        fs::write(&enc, &encrypted).unwrap();

        let err = decrypt_file(&keys, &enc, &out).unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnsupportedVersion { version: 9, .. }
        ));
    }

    #[test]
    fn test_ciphertext_differs_between_runs() {
        // Fresh session key and nonce per call: identical plaintext must not
        // produce identical files.
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::new("test key");
        let src = write_volume(&dir, "VOL-0001", &sample_contents());
        let enc_a = dir.path().join("a.enc");
        let enc_b = dir.path().join("b.enc");

        encrypt_file(&keys, &src, &enc_a).unwrap();
        encrypt_file(&keys, &src, &enc_b).unwrap();

        assert_ne!(fs::read(&enc_a).unwrap(), fs::read(&enc_b).unwrap());
    }
}
