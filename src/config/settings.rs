//! Settings file loading and property resolution
//!
//! Settings come from a JSON file (default `/etc/bareos/s3-storage.json`),
//! with environment variables taking precedence over the file so a single
//! run can override any value without editing it. A missing file is only a
//! warning; individual settings are validated when a job actually needs
//! them, with an error naming the setting and where to put it.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};
use crate::store::RestoreTier;

/// Environment variable overriding the bucket name
pub const ENV_BUCKET: &str = "BAREOS_S3_BUCKET";
/// Environment variable overriding the store root directory
pub const ENV_STORE_ROOT: &str = "BAREOS_S3_STORE_ROOT";
/// Environment variable overriding the encryption passphrase
pub const ENV_PASSPHRASE: &str = "BAREOS_S3_PASSPHRASE";
/// Environment variable overriding the archival restore tier
pub const ENV_RESTORE_TIER: &str = "BAREOS_S3_RESTORE_TIER";
/// Environment variable overriding the restore retention window
pub const ENV_RESTORE_RETENTION_DAYS: &str = "BAREOS_S3_RESTORE_RETENTION_DAYS";

fn default_retention_days() -> u32 {
    3
}

/// Settings for the storage jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Bucket holding the encrypted volumes
    #[serde(default)]
    pub bucket: Option<String>,

    /// Root directory of the object store backend
    #[serde(default)]
    pub store_root: Option<PathBuf>,

    /// Encryption passphrase; prompted for interactively when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    /// Retrieval tier used when thawing archival objects
    #[serde(default)]
    pub restore_tier: RestoreTier,

    /// How many days a thawed copy stays retrievable
    #[serde(default = "default_retention_days")]
    pub restore_retention_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bucket: None,
            store_root: None,
            passphrase: None,
            restore_tier: RestoreTier::default(),
            restore_retention_days: default_retention_days(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// A missing file yields defaults with a warning, matching the original
    /// behavior: required settings are enforced later, when a job needs them.
    pub fn load(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            eprintln!("Warning: Config file not found at {}", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            StorageError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            StorageError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Resolve the bucket name
    pub fn bucket(&self, config_path: &Path) -> StorageResult<String> {
        required(
            self.bucket.as_deref(),
            ENV_BUCKET,
            "bucket",
            config_path,
        )
    }

    /// Resolve the store root directory
    pub fn store_root(&self, config_path: &Path) -> StorageResult<PathBuf> {
        let root = required(
            self.store_root.as_deref().and_then(Path::to_str),
            ENV_STORE_ROOT,
            "store_root",
            config_path,
        )?;
        Ok(PathBuf::from(root))
    }

    /// Resolve the encryption passphrase, prompting as a last resort
    pub fn passphrase(&self, _config_path: &Path) -> StorageResult<Zeroizing<String>> {
        if let Ok(value) = env::var(ENV_PASSPHRASE) {
            if !value.trim().is_empty() {
                return Ok(Zeroizing::new(value));
            }
        }
        if let Some(value) = self.passphrase.as_deref() {
            if !value.trim().is_empty() {
                return Ok(Zeroizing::new(value.to_string()));
            }
        }
        let value = rpassword::prompt_password("Encryption passphrase: ")
            .map_err(|e| StorageError::Config(format!("Failed to read passphrase: {}", e)))?;
        if value.trim().is_empty() {
            return Err(StorageError::Config(
                "The encryption passphrase must not be empty".to_string(),
            ));
        }
        Ok(Zeroizing::new(value))
    }

    /// Resolve the archival restore tier
    pub fn restore_tier(&self) -> StorageResult<RestoreTier> {
        match env::var(ENV_RESTORE_TIER) {
            Ok(value) if !value.trim().is_empty() => {
                value.parse().map_err(StorageError::Config)
            }
            _ => Ok(self.restore_tier),
        }
    }

    /// Resolve the restore retention window in days
    pub fn restore_retention_days(&self) -> StorageResult<u32> {
        match env::var(ENV_RESTORE_RETENTION_DAYS) {
            Ok(value) if !value.trim().is_empty() => value.parse().map_err(|_| {
                StorageError::Config(format!(
                    "{} must be a number of days; was {}",
                    ENV_RESTORE_RETENTION_DAYS, value
                ))
            }),
            _ => Ok(self.restore_retention_days),
        }
    }
}

fn required(
    value: Option<&str>,
    env_var: &str,
    setting: &str,
    config_path: &Path,
) -> StorageResult<String> {
    if let Ok(v) = env::var(env_var) {
        if !v.trim().is_empty() {
            return Ok(v);
        }
    }
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(StorageError::Config(format!(
            "A value is required for the setting {}. Add it to {}, or set the {} environment \
             variable.",
            setting,
            config_path.display(),
            env_var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("nope.json")).unwrap();
        assert!(settings.bucket.is_none());
        assert_eq!(settings.restore_tier, RestoreTier::Standard);
        assert_eq!(settings.restore_retention_days, 3);
    }

    #[test]
    fn test_load_full_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s3-storage.json");
        fs::write(
            &path,
            r#"{
                "bucket": "backups",
                "store_root": "/srv/object-store",
                "passphrase": "hunter2",
                "restore_tier": "bulk",
                "restore_retention_days": 7
            }"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.bucket(&path).unwrap(), "backups");
        assert_eq!(
            settings.store_root(&path).unwrap(),
            PathBuf::from("/srv/object-store")
        );
        assert_eq!(settings.passphrase(&path).unwrap().as_str(), "hunter2");
        assert_eq!(settings.restore_tier().unwrap(), RestoreTier::Bulk);
        assert_eq!(settings.restore_retention_days().unwrap(), 7);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s3-storage.json");
        fs::write(&path, "not json").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_missing_bucket_names_the_setting() {
        let path = PathBuf::from("/etc/bareos/s3-storage.json");
        let err = Settings::default().bucket(&path).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("bucket"));
        assert!(text.contains("/etc/bareos/s3-storage.json"));
        assert!(text.contains(ENV_BUCKET));
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s3-storage.json");
        fs::write(&path, r#"{"bucket": "backups"}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.restore_tier().unwrap(), RestoreTier::Standard);
        assert_eq!(settings.restore_retention_days().unwrap(), 3);
        assert!(settings.store_root(&path).is_err());
    }
}
