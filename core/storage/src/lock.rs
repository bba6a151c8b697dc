//! Exclusive lock file guarding the registry during a pass.

use std::path::{Path, PathBuf};
use tracing::warn;

use docsync_common::{Error, Result};

/// Held for the duration of a pass; the lock file is removed on drop.
#[derive(Debug)]
pub struct RootLock {
    path: PathBuf,
}

impl RootLock {
    /// Create the lock file, failing if another holder already created it.
    ///
    /// # Errors
    /// - `Locked` if the file already exists
    /// - I/O errors creating the file
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::Locked(path)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".docsync.lock");

        let lock = RootLock::acquire(&path).unwrap();
        let err = RootLock::acquire(&path).unwrap_err();
        assert!(matches!(err, Error::Locked(_)));

        drop(lock);
        assert!(!path.exists());
        let _again = RootLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_leftover_lock_names_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".docsync.lock");
        std::fs::write(&path, "").unwrap();

        let message = RootLock::acquire(&path).unwrap_err().to_string();
        assert!(message.contains(&path.display().to_string()));
        assert!(message.contains("remove it if no other docsync is running"));
    }
}
