//! Converter backed by the `pandoc` command-line tool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::converter::Converter;
use docsync_common::{DocFormat, Error, Result};

/// Runs `pandoc <source> -f <from> -t <to> -o <output>` per document.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl PandocConverter {
    /// Use `pandoc` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("pandoc")
    }

    /// Use a specific pandoc executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Append extra arguments passed to every invocation.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether the executable can be launched at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn command(&self, source: &Path, from: DocFormat, to: DocFormat, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(source)
            .arg("-f")
            .arg(from.pandoc_name())
            .arg("-t")
            .arg(to.pandoc_name())
            .arg("-o")
            .arg(output)
            .args(&self.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for PandocConverter {
    fn name(&self) -> &str {
        "pandoc"
    }

    async fn convert(
        &self,
        source: &Path,
        from: DocFormat,
        to: DocFormat,
        output: &Path,
    ) -> Result<PathBuf> {
        debug!(
            "pandoc {} ({} -> {}) into {}",
            source.display(),
            from,
            to,
            output.display()
        );

        let result = self.command(source, from, to, output).output().await;

        let reason = match result {
            Ok(out) if out.status.success() => return Ok(output.to_path_buf()),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                if stderr.is_empty() {
                    format!("pandoc exited with {}", out.status)
                } else {
                    stderr
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                format!("converter not found: {}", self.program.display())
            }
            Err(e) => e.to_string(),
        };

        let _ = tokio::fs::remove_file(output).await;
        Err(Error::Conversion {
            path: source.to_path_buf(),
            reason,
        })
    }
}
