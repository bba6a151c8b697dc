//! Atomic file replacement.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use docsync_common::{Error, Result};

/// Temporary sibling path for staging a write to `target`.
///
/// The name is hidden and carries a `.tmp` suffix so it never matches a
/// tracked document format.
pub fn staging_path_for(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staged = format!(".{}.{}.tmp", file_name, Uuid::new_v4());
    match target.parent() {
        Some(parent) => parent.join(staged),
        None => PathBuf::from(staged),
    }
}

/// Replace `target` with `data` so readers see either the old or the new
/// content, never a partial write.
///
/// # Errors
/// - Parent directory missing
/// - I/O errors while writing or renaming (the temporary file is removed)
pub async fn replace_file(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() && !fs::try_exists(parent).await? {
            return Err(Error::NotFound(format!(
                "Parent directory not found: {}",
                parent.display()
            )));
        }
    }

    let staged = staging_path_for(target);
    let result = write_and_rename(&staged, target, data).await;
    if result.is_err() {
        let _ = fs::remove_file(&staged).await;
    }
    result
}

async fn write_and_rename(staged: &Path, target: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(staged).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(staged, target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_replace_creates_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("state.json");

        replace_file(&target, b"first").await.unwrap();
        assert_eq!(fs::read(&target).await.unwrap(), b"first");

        replace_file(&target, b"second").await.unwrap();
        assert_eq!(fs::read(&target).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_replace_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("state.json");
        replace_file(&target, b"data").await.unwrap();

        let mut entries = fs::read_dir(temp.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["state.json".to_string()]);
    }

    #[tokio::test]
    async fn test_replace_missing_parent() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("missing").join("state.json");
        let err = replace_file(&target, b"data").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let staged = staging_path_for(Path::new("/remote/notes.docx"));
        assert_eq!(staged.parent(), Some(Path::new("/remote")));
        let name = staged.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(".notes.docx."));
        assert!(name.ends_with(".tmp"));
    }
}
