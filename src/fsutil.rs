//! Small filesystem helpers shared by the codec and the jobs

use std::fs;
use std::path::{Path, PathBuf};

/// Deletes a file when dropped unless disarmed first
///
/// Temporary ciphertext and partially decrypted plaintext must not survive a
/// failing code path; tying their removal to scope exit covers every early
/// return in one place.
pub(crate) struct RemoveOnDrop {
    path: PathBuf,
    armed: bool,
}

impl RemoveOnDrop {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    /// Keep the file: the operation it belongs to completed successfully
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Best-effort display name for a path (falls back to the full path)
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_removes_file_when_armed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leftover");
        fs::write(&path, b"data").unwrap();
        {
            let _guard = RemoveOnDrop::new(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_keeps_file_when_disarmed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keeper");
        fs::write(&path, b"data").unwrap();
        {
            let mut guard = RemoveOnDrop::new(&path);
            guard.disarm();
        }
        assert!(path.exists());
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let _guard = RemoveOnDrop::new(dir.path().join("never-created"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(Path::new("/tmp/scratch/VOL-0001")), "VOL-0001");
    }
}
