//! Identity converter.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::converter::Converter;
use docsync_common::{DocFormat, Error, Result};

/// Copies bytes unchanged regardless of the formats involved.
///
/// Stands in for a real converter in tests and `--passthrough` runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughConverter;

impl PassthroughConverter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Converter for PassthroughConverter {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn convert(
        &self,
        source: &Path,
        _from: DocFormat,
        _to: DocFormat,
        output: &Path,
    ) -> Result<PathBuf> {
        match fs::copy(source, output).await {
            Ok(_) => Ok(output.to_path_buf()),
            Err(e) => {
                let _ = fs::remove_file(output).await;
                Err(Error::Conversion {
                    path: source.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_preserves_bytes() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.md");
        let remote = temp.path().join("a.docx");
        let back = temp.path().join("b.md");
        fs::write(&source, "# Title\n\nBody text.\n").await.unwrap();

        let converter = PassthroughConverter::new();
        converter
            .convert(&source, DocFormat::Markdown, DocFormat::Docx, &remote)
            .await
            .unwrap();
        converter
            .convert(&remote, DocFormat::Docx, DocFormat::Markdown, &back)
            .await
            .unwrap();

        assert_eq!(fs::read(&source).await.unwrap(), fs::read(&back).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_source_fails_cleanly() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.docx");
        let err = PassthroughConverter
            .convert(
                &temp.path().join("missing.md"),
                DocFormat::Markdown,
                DocFormat::Docx,
                &output,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
        assert!(!output.exists());
    }
}
