//! Document root on the local filesystem.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::atomic::{replace_file, staging_path_for};
use docsync_common::{timestamp_from_system, DocFormat, DocName, Error, Result, Timestamp};

/// A flat directory of documents.
///
/// Used for both the local (plain-text) root and the remote root that an
/// external client mirrors to a cloud store. Only files directly inside the
/// directory are visible.
#[derive(Debug, Clone)]
pub struct DocumentRoot {
    root: PathBuf,
}

impl DocumentRoot {
    /// Wrap a directory path without touching the filesystem.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Wrap a directory path, verifying it exists and is a directory.
    ///
    /// # Errors
    /// - `MissingRoot` if the path is absent, inaccessible or not a directory
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = Self::new(root);
        root.ensure_exists().await?;
        Ok(root)
    }

    /// Directory this root points at.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a document inside this root.
    pub fn path_of(&self, name: &DocName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Fail with `MissingRoot` unless the directory is present.
    pub async fn ensure_exists(&self) -> Result<()> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(Error::MissingRoot(self.root.clone())),
        }
    }

    /// List documents of `format` directly inside the root, sorted by name.
    ///
    /// Hidden files, directories and names that are not valid UTF-8 are
    /// skipped.
    pub async fn list_documents(&self, format: DocFormat) -> Result<Vec<DocName>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingRoot(self.root.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Some(file_name) = entry.file_name().to_str().map(String::from) else {
                debug!("Skipping non UTF-8 name in {}", self.root.display());
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }

            // Follow symlinks so a linked document counts as a file.
            let is_file = match fs::metadata(entry.path()).await {
                Ok(meta) => meta.is_file(),
                Err(_) => false,
            };
            if !is_file {
                continue;
            }

            if let Ok(name) = DocName::parse(&file_name) {
                if name.has_format(format) {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Current modification time of a document, or `None` if it is absent.
    ///
    /// # Errors
    /// - `InvalidInput` if the name refers to something other than a file
    /// - I/O errors other than not-found
    pub async fn modified(&self, name: &DocName) -> Result<Option<Timestamp>> {
        let path = self.path_of(name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(timestamp_from_system(meta.modified()?))),
            Ok(_) => Err(Error::InvalidInput(format!(
                "Not a regular file: {}",
                path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a document's bytes.
    pub async fn read(&self, name: &DocName) -> Result<Vec<u8>> {
        let path = self.path_of(name);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "File not found: {}",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically write a document and return its new modification time.
    pub async fn write_atomic(&self, name: &DocName, data: &[u8]) -> Result<Timestamp> {
        let path = self.path_of(name);
        replace_file(&path, data).await?;
        self.require_modified(name).await
    }

    /// Hidden temporary path beside `name` for a converter to write into.
    pub fn staging_path(&self, name: &DocName) -> PathBuf {
        staging_path_for(&self.path_of(name))
    }

    /// Move a staged file over `name` and return the new modification time.
    pub async fn commit_staged(&self, staged: &Path, name: &DocName) -> Result<Timestamp> {
        let target = self.path_of(name);
        debug!("Committing {} -> {}", staged.display(), target.display());
        fs::rename(staged, &target).await?;
        self.require_modified(name).await
    }

    /// Remove a staged file if it exists.
    pub async fn discard_staged(&self, staged: &Path) {
        if let Err(e) = fs::remove_file(staged).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Failed to remove staged file {}: {}", staged.display(), e);
            }
        }
    }

    async fn require_modified(&self, name: &DocName) -> Result<Timestamp> {
        self.modified(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("File vanished after write: {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(s: &str) -> DocName {
        DocName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = DocumentRoot::open(temp.path().join("gone")).await.unwrap_err();
        assert!(matches!(err, Error::MissingRoot(_)));
    }

    #[tokio::test]
    async fn test_list_is_flat_and_filtered() {
        let temp = TempDir::new().unwrap();
        let root = DocumentRoot::open(temp.path()).await.unwrap();

        fs::write(temp.path().join("b.md"), "b").await.unwrap();
        fs::write(temp.path().join("a.md"), "a").await.unwrap();
        fs::write(temp.path().join("c.docx"), "c").await.unwrap();
        fs::write(temp.path().join(".hidden.md"), "h").await.unwrap();
        fs::create_dir(temp.path().join("nested.md")).await.unwrap();
        fs::create_dir(temp.path().join("sub")).await.unwrap();
        fs::write(temp.path().join("sub").join("deep.md"), "d").await.unwrap();

        let names = root.list_documents(DocFormat::Markdown).await.unwrap();
        assert_eq!(names, vec![name("a.md"), name("b.md")]);
    }

    #[tokio::test]
    async fn test_modified_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let root = DocumentRoot::open(temp.path()).await.unwrap();
        assert!(root.modified(&name("nope.md")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_atomic_and_read() {
        let temp = TempDir::new().unwrap();
        let root = DocumentRoot::open(temp.path()).await.unwrap();

        let mtime = root.write_atomic(&name("x.md"), b"hello").await.unwrap();
        assert_eq!(root.read(&name("x.md")).await.unwrap(), b"hello");
        assert_eq!(root.modified(&name("x.md")).await.unwrap(), Some(mtime));
    }

    #[tokio::test]
    async fn test_commit_and_discard_staged() {
        let temp = TempDir::new().unwrap();
        let root = DocumentRoot::open(temp.path()).await.unwrap();

        let staged = root.staging_path(&name("x.docx"));
        fs::write(&staged, b"converted").await.unwrap();
        root.commit_staged(&staged, &name("x.docx")).await.unwrap();
        assert!(!staged.exists());
        assert_eq!(root.read(&name("x.docx")).await.unwrap(), b"converted");

        let other = root.staging_path(&name("y.docx"));
        fs::write(&other, b"partial").await.unwrap();
        root.discard_staged(&other).await;
        assert!(!other.exists());
        // Discarding twice is harmless.
        root.discard_staged(&other).await;
    }
}
